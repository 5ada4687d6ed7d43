//! flowgate CLI - talk to MinRUE and RAGFlow backends from the shell.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowgate::client::{CreateDataset, Message};
use flowgate::{BatchPoller, Config, MinRueClient, PollSettings, RagflowClient};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "flowgate")]
#[command(version)]
#[command(about = "Client toolkit for MinRUE and RAGFlow backends")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "flowgate.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// MinRUE inference backend operations
    Minrue {
        #[command(subcommand)]
        command: MinrueCommands,
    },

    /// RAGFlow service operations
    Ragflow {
        #[command(subcommand)]
        command: RagflowCommands,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

#[derive(Subcommand)]
enum MinrueCommands {
    /// Check service health status
    Health,

    /// List available models
    Models,

    /// List supported task types
    Tasks,

    /// Upload a file for processing
    Process {
        /// Path to file to process
        file_path: PathBuf,

        /// Path to save results; when set, waits for the job to finish
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Model to use (defaults to config value)
        #[arg(short, long)]
        model: Option<String>,

        /// Task type (defaults to config value)
        #[arg(short, long)]
        task: Option<String>,

        /// Temperature parameter
        #[arg(long)]
        temperature: Option<f64>,

        /// Maximum tokens parameter
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// Wait for a job and retrieve its result
    Result {
        /// Job ID to retrieve results for
        job_id: String,

        /// Path to save results
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum RagflowCommands {
    /// Create a chat completion
    Chat {
        /// Chat assistant ID
        #[arg(long)]
        chat_id: String,

        /// Message to send
        #[arg(short, long)]
        message: String,

        /// Do not include references in the response
        #[arg(long)]
        no_reference: bool,
    },

    /// Dataset management operations
    Dataset {
        #[command(subcommand)]
        command: DatasetCommands,
    },

    /// Document management operations
    Document {
        #[command(subcommand)]
        command: DocumentCommands,
    },

    /// Knowledge graph operations
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },
}

#[derive(Subcommand)]
enum DatasetCommands {
    /// Create a dataset
    Create {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "BAAI/bge-large-zh-v1.5@BAAI")]
        embedding_model: String,
    },

    /// List datasets
    List {
        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "30")]
        page_size: u32,
    },

    /// Delete datasets
    Delete {
        /// Dataset IDs to delete
        #[arg(long, num_args = 1..)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DocumentCommands {
    /// Upload documents to a dataset
    Upload {
        #[arg(long)]
        dataset_id: String,

        /// Files to upload
        #[arg(long, num_args = 1..)]
        file: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
enum GraphCommands {
    /// Start knowledge-graph construction
    Build {
        #[arg(long)]
        dataset_id: String,
    },

    /// Show current construction status
    Status {
        #[arg(long)]
        dataset_id: String,
    },

    /// Wait for construction to finish on one or more datasets
    Wait {
        #[arg(long, num_args = 1..)]
        dataset_id: Vec<String>,
    },

    /// Delete the knowledge graph
    Delete {
        #[arg(long)]
        dataset_id: String,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# flowgate configuration file

[minrue]
base_url = "http://localhost:8000/v1"
timeout_secs = 30
max_retries = 3
model = "mistral-7b-instruct"
task = "text-refinement"

[ragflow]
# API key (can also use RAGFLOW_API_KEY env var)
# api_key = "ragflow-..."
base_url = "http://localhost:9380/api/v1"
timeout_secs = 30
max_retries = 3

[poll]
interval_secs = 3
deadline_secs = 120
max_concurrent = 8
"#;
    println!("{example}");
}

fn save_or_print(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Results saved to: {}", path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}

async fn run_minrue(config: Config, command: MinrueCommands) -> Result<()> {
    let client = MinRueClient::new(&config.minrue)?;
    let settings = PollSettings::from_config(&config.poll);

    match command {
        MinrueCommands::Health => {
            let health = client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }

        MinrueCommands::Models => {
            let models = client.list_models().await?;
            println!("{}", serde_json::to_string_pretty(&models)?);
        }

        MinrueCommands::Tasks => {
            let tasks = client.list_tasks().await?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }

        MinrueCommands::Process {
            file_path,
            output,
            model,
            task,
            temperature,
            max_tokens,
        } => {
            let model = model.unwrap_or_else(|| config.minrue.model.clone());
            let task = task.unwrap_or_else(|| config.minrue.task.clone());

            let mut parameters = json!({});
            if let Some(temperature) = temperature {
                parameters["temperature"] = json!(temperature);
            }
            if let Some(max_tokens) = max_tokens {
                parameters["max_tokens"] = json!(max_tokens);
            }

            let job = client.submit(&file_path, &model, &task, &parameters).await?;
            println!("Processing started with job ID: {}", job.job_id);

            match output {
                Some(output) => {
                    info!(job_id = %job.job_id, "Waiting for results");
                    let snapshot = client.wait_for_result(&job.job_id, settings).await?;
                    save_or_print(Some(&output), snapshot.output.as_deref().unwrap_or(""))?;
                }
                None => {
                    println!("To check results later: flowgate minrue result {}", job.job_id);
                }
            }
        }

        MinrueCommands::Result { job_id, output } => {
            let snapshot = client.wait_for_result(&job_id, settings).await?;
            save_or_print(output.as_deref(), snapshot.output.as_deref().unwrap_or(""))?;
        }
    }

    Ok(())
}

async fn run_ragflow(config: Config, command: RagflowCommands) -> Result<()> {
    let client = RagflowClient::new(&config.ragflow)?;
    let settings = PollSettings::from_config(&config.poll);

    match command {
        RagflowCommands::Chat {
            chat_id,
            message,
            no_reference,
        } => {
            let messages = vec![Message::user(message)];
            let response = client
                .chat_completion(&chat_id, &messages, !no_reference, None)
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        RagflowCommands::Dataset { command } => match command {
            DatasetCommands::Create {
                name,
                embedding_model,
            } => {
                let mut options = CreateDataset::new(name);
                options.embedding_model = embedding_model;
                let dataset = client.create_dataset(&options).await?;
                println!("Created dataset: {} (ID: {})", dataset.name, dataset.id);
            }

            DatasetCommands::List { page, page_size } => {
                let datasets = client.list_datasets(page, page_size, None, None).await?;
                println!("Found {} datasets:", datasets.len());
                for dataset in datasets {
                    println!(
                        "- {} (ID: {}) - {} documents",
                        dataset.name,
                        dataset.id,
                        dataset.document_count.unwrap_or(0)
                    );
                }
            }

            DatasetCommands::Delete { ids } => {
                client.delete_datasets(&ids).await?;
                println!("Deleted {} datasets", ids.len());
            }
        },

        RagflowCommands::Document { command } => match command {
            DocumentCommands::Upload { dataset_id, file } => {
                let paths: Vec<&Path> = file.iter().map(PathBuf::as_path).collect();
                let documents = client.upload_documents(&dataset_id, &paths).await?;
                println!("Uploaded {} documents", documents.len());
                for doc in documents {
                    println!("- {} (ID: {})", doc.name, doc.id);
                }
            }
        },

        RagflowCommands::Graph { command } => match command {
            GraphCommands::Build { dataset_id } => {
                client.build_knowledge_graph(&dataset_id).await?;
                println!("Knowledge graph construction started for {dataset_id}");
            }

            GraphCommands::Status { dataset_id } => {
                let snapshot = client.graph_build_status(&dataset_id).await?;
                println!("{}: {}", dataset_id, snapshot.status);
                if let Some(detail) = snapshot.output.or(snapshot.error) {
                    println!("{detail}");
                }
            }

            GraphCommands::Wait { dataset_id } => {
                wait_for_graphs(client, dataset_id, settings, config.poll.max_concurrent).await?;
            }

            GraphCommands::Delete { dataset_id } => {
                client.delete_knowledge_graph(&dataset_id).await?;
                println!("Knowledge graph deleted for {dataset_id}");
            }
        },
    }

    Ok(())
}

/// Wait for graph builds on several datasets at once.
async fn wait_for_graphs(
    client: RagflowClient,
    dataset_ids: Vec<String>,
    settings: PollSettings,
    max_concurrent: usize,
) -> Result<()> {
    let client = Arc::new(client);
    let poller = BatchPoller::new(max_concurrent, settings);

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner());
    pb.set_message(format!("Waiting for {} graph builds...", dataset_ids.len()));
    pb.enable_steady_tick(Duration::from_millis(120));

    let check = {
        let client = Arc::clone(&client);
        move |id: String| {
            let client = Arc::clone(&client);
            async move { client.graph_build_status(&id).await }
        }
    };

    let results = poller.poll_all(dataset_ids, check).await;
    pb.finish_and_clear();

    let mut failures = 0;
    for (dataset_id, outcome) in results {
        match outcome {
            Ok(_) => println!("{dataset_id}: completed"),
            Err(e) => {
                failures += 1;
                println!("{dataset_id}: {e}");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} graph builds did not complete");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            config
                .ragflow
                .resolve_api_key()
                .context("Failed to resolve RAGFlow API key")?;

            info!("Configuration is valid");
            info!("  MinRUE:   {}", config.minrue.base_url);
            info!("  RAGFlow:  {}", config.ragflow.base_url);
            info!(
                "  Polling:  every {}s, up to {}s, {} concurrent",
                config.poll.interval_secs, config.poll.deadline_secs, config.poll.max_concurrent
            );
        }

        Commands::Minrue { command } => {
            let config = load_config(&cli.config)?;
            run_minrue(config, command).await?;
        }

        Commands::Ragflow { command } => {
            let config = load_config(&cli.config)?;
            run_ragflow(config, command).await?;
        }
    }

    Ok(())
}

/// Load config, falling back to defaults when no file exists.
fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
    } else {
        Ok(toml::from_str("").expect("empty config parses to defaults"))
    }
}
