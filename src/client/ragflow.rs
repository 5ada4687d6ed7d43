//! Client for the RAGFlow RESTful API.
//!
//! Covers chat/agent completions (OpenAI-compatible, no envelope), dataset
//! and document management, and knowledge-graph / RAPTOR index builds.
//! Most endpoints wrap their payload in a `{code, message, data}` envelope;
//! a non-zero code is a service-level error even on HTTP 200.
//!
//! Graph and RAPTOR builds are asynchronous server-side; their trace
//! endpoints are adapted to [`JobSnapshot`] so the shared poller can wait
//! on them.

use crate::client::HttpClient;
use crate::models::{
    expand_headers, FlowgateError, JobSnapshot, JobStatus, RagflowConfig, Result,
};
use crate::poll::{poll_job, PollSettings};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;

/// Message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Dataset summary as reported by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub document_count: Option<u64>,
}

/// Document summary as reported by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentInfo {
    pub id: String,
    pub name: String,
}

/// Options for creating a dataset.
#[derive(Debug, Clone)]
pub struct CreateDataset {
    pub name: String,
    pub embedding_model: String,
    pub permission: String,
    pub chunk_method: String,
    pub parser_config: Option<Value>,
}

impl CreateDataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            embedding_model: "BAAI/bge-large-zh-v1.5@BAAI".to_string(),
            permission: "me".to_string(),
            chunk_method: "naive".to_string(),
            parser_config: None,
        }
    }
}

/// Service response envelope: `{code, message, data}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Wire shape of the graph/RAPTOR trace endpoints.
#[derive(Debug, Deserialize)]
struct TraceResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress_msg: Option<String>,
}

/// Client for the RAGFlow API.
pub struct RagflowClient {
    http: HttpClient,
}

impl RagflowClient {
    /// Create a client from configuration, resolving the API key from the
    /// config value or environment.
    pub fn new(config: &RagflowConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        let http = HttpClient::new(
            "ragflow".to_string(),
            Some(api_key),
            config.base_url.clone(),
            expand_headers(&config.headers),
            config.timeout_secs,
            config.max_retries,
        )?;
        Ok(Self { http })
    }

    /// Unwrap the service envelope; a non-zero code is a service error.
    fn unwrap_envelope(envelope: Envelope) -> Result<Value> {
        if envelope.code != 0 {
            return Err(FlowgateError::Api {
                status: envelope.code.clamp(0, u16::MAX as i64) as u16,
                message: envelope.message.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    fn from_data<T: serde::de::DeserializeOwned>(data: Value) -> Result<T> {
        serde_json::from_value(data)
            .map_err(|e| FlowgateError::ParseError(format!("Unexpected response shape: {e}")))
    }

    // --- Chat (OpenAI-compatible, no envelope) ---

    /// Create a chat completion against a configured chat assistant.
    pub async fn chat_completion(
        &self,
        chat_id: &str,
        messages: &[Message],
        reference: bool,
        metadata_condition: Option<Value>,
    ) -> Result<Value> {
        let body = json!({
            // The server resolves the model from the chat assistant
            "model": "model",
            "messages": messages,
            "stream": false,
            "extra_body": {
                "reference": reference,
                "metadata_condition": metadata_condition,
            },
        });

        self.http
            .post_json(&format!("chats_openai/{chat_id}/chat/completions"), &body)
            .await
    }

    /// Create an agent completion.
    pub async fn agent_completion(
        &self,
        agent_id: &str,
        messages: &[Message],
        session_id: Option<&str>,
    ) -> Result<Value> {
        let mut body = json!({
            "model": "model",
            "messages": messages,
            "stream": false,
        });
        if let Some(session_id) = session_id {
            body["session_id"] = json!(session_id);
        }

        self.http
            .post_json(&format!("agents_openai/{agent_id}/chat/completions"), &body)
            .await
    }

    // --- Datasets ---

    /// Create a dataset.
    pub async fn create_dataset(&self, options: &CreateDataset) -> Result<DatasetInfo> {
        let mut body = json!({
            "name": options.name,
            "embedding_model": options.embedding_model,
            "permission": options.permission,
            "chunk_method": options.chunk_method,
        });
        if let Some(parser_config) = &options.parser_config {
            body["parser_config"] = parser_config.clone();
        }

        let envelope: Envelope = self.http.post_json("datasets", &body).await?;
        let dataset: DatasetInfo = Self::from_data(Self::unwrap_envelope(envelope)?)?;
        info!(dataset_id = %dataset.id, name = %dataset.name, "Created dataset");
        Ok(dataset)
    }

    /// List datasets, optionally filtered by name or id.
    pub async fn list_datasets(
        &self,
        page: u32,
        page_size: u32,
        name: Option<&str>,
        id: Option<&str>,
    ) -> Result<Vec<DatasetInfo>> {
        let mut query = vec![
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
            ("orderby", "create_time".to_string()),
            ("desc", "true".to_string()),
        ];
        if let Some(name) = name {
            query.push(("name", name.to_string()));
        }
        if let Some(id) = id {
            query.push(("id", id.to_string()));
        }

        let envelope: Envelope = self.http.get_json_query("datasets", &query).await?;
        Self::from_data(Self::unwrap_envelope(envelope)?)
    }

    /// Update dataset configuration.
    pub async fn update_dataset(&self, dataset_id: &str, updates: &Value) -> Result<()> {
        let envelope: Envelope = self
            .http
            .put_json(&format!("datasets/{dataset_id}"), updates)
            .await?;
        Self::unwrap_envelope(envelope)?;
        Ok(())
    }

    /// Delete one or more datasets.
    pub async fn delete_datasets(&self, dataset_ids: &[String]) -> Result<()> {
        let body = json!({ "ids": dataset_ids });
        let envelope: Envelope = self.http.delete_json("datasets", Some(&body)).await?;
        Self::unwrap_envelope(envelope)?;
        info!(count = dataset_ids.len(), "Deleted datasets");
        Ok(())
    }

    // --- Documents ---

    /// Upload documents to a dataset.
    pub async fn upload_documents(
        &self,
        dataset_id: &str,
        file_paths: &[&Path],
    ) -> Result<Vec<DocumentInfo>> {
        let mut files = Vec::with_capacity(file_paths.len());
        for path in file_paths {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| FlowgateError::io(format!("reading {}", path.display()), e))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    FlowgateError::InvalidInput(format!("not a file path: {}", path.display()))
                })?;
            files.push((name, bytes));
        }

        let envelope: Envelope = self
            .http
            .post_multipart(&format!("datasets/{dataset_id}/documents"), || {
                let mut form = Form::new();
                for (name, bytes) in &files {
                    form = form.part("file", Part::bytes(bytes.clone()).file_name(name.clone()));
                }
                form
            })
            .await?;

        let documents: Vec<DocumentInfo> = Self::from_data(Self::unwrap_envelope(envelope)?)?;
        info!(dataset_id = %dataset_id, count = documents.len(), "Uploaded documents");
        Ok(documents)
    }

    /// Update document configuration.
    pub async fn update_document(
        &self,
        dataset_id: &str,
        document_id: &str,
        updates: &Value,
    ) -> Result<()> {
        let envelope: Envelope = self
            .http
            .put_json(
                &format!("datasets/{dataset_id}/documents/{document_id}"),
                updates,
            )
            .await?;
        Self::unwrap_envelope(envelope)?;
        Ok(())
    }

    // --- Knowledge graph ---

    /// Kick off knowledge-graph construction for a dataset.
    pub async fn build_knowledge_graph(&self, dataset_id: &str) -> Result<()> {
        let envelope: Envelope = self
            .http
            .post_empty(&format!("datasets/{dataset_id}/run_graphrag"))
            .await?;
        Self::unwrap_envelope(envelope)?;
        info!(dataset_id = %dataset_id, "Knowledge graph construction started");
        Ok(())
    }

    /// Retrieve the constructed knowledge graph.
    pub async fn knowledge_graph(&self, dataset_id: &str) -> Result<Value> {
        let envelope: Envelope = self
            .http
            .get_json(&format!("datasets/{dataset_id}/knowledge_graph"))
            .await?;
        Self::unwrap_envelope(envelope)
    }

    /// Read graph construction progress as a job snapshot.
    ///
    /// The dataset id stands in as the job id; the build is the unit of
    /// asynchronous work.
    pub async fn graph_build_status(&self, dataset_id: &str) -> Result<JobSnapshot> {
        let envelope: Envelope = self
            .http
            .get_json(&format!("datasets/{dataset_id}/trace_graphrag"))
            .await?;
        let trace: TraceResponse = Self::from_data(Self::unwrap_envelope(envelope)?)?;
        Ok(Self::trace_to_snapshot(dataset_id, trace))
    }

    /// Delete the knowledge graph for a dataset.
    pub async fn delete_knowledge_graph(&self, dataset_id: &str) -> Result<()> {
        let envelope: Envelope = self
            .http
            .delete_json(&format!("datasets/{dataset_id}/knowledge_graph"), None)
            .await?;
        Self::unwrap_envelope(envelope)?;
        info!(dataset_id = %dataset_id, "Knowledge graph deleted");
        Ok(())
    }

    /// Poll graph construction until it finishes or the deadline passes.
    pub async fn wait_for_graph(
        &self,
        dataset_id: &str,
        settings: PollSettings,
    ) -> Result<JobSnapshot> {
        poll_job(dataset_id, || self.graph_build_status(dataset_id), settings).await
    }

    // --- RAPTOR ---

    /// Kick off RAPTOR index construction for a dataset.
    pub async fn build_raptor(&self, dataset_id: &str) -> Result<()> {
        let envelope: Envelope = self
            .http
            .post_empty(&format!("datasets/{dataset_id}/run_raptor"))
            .await?;
        Self::unwrap_envelope(envelope)?;
        info!(dataset_id = %dataset_id, "RAPTOR construction started");
        Ok(())
    }

    /// Read RAPTOR construction progress as a job snapshot.
    pub async fn raptor_build_status(&self, dataset_id: &str) -> Result<JobSnapshot> {
        let envelope: Envelope = self
            .http
            .get_json(&format!("datasets/{dataset_id}/trace_raptor"))
            .await?;
        let trace: TraceResponse = Self::from_data(Self::unwrap_envelope(envelope)?)?;
        Ok(Self::trace_to_snapshot(dataset_id, trace))
    }

    fn trace_to_snapshot(dataset_id: &str, trace: TraceResponse) -> JobSnapshot {
        // A trace without a status field means the build has not been
        // scheduled yet; treat it as pending rather than failing.
        let status = trace
            .status
            .as_deref()
            .map(JobStatus::parse)
            .unwrap_or(JobStatus::Pending);

        let mut snapshot = JobSnapshot::new(dataset_id, status);
        match snapshot.status {
            JobStatus::Failed => snapshot.error = trace.progress_msg,
            _ => snapshot.output = trace.progress_msg,
        }
        snapshot
    }
}
