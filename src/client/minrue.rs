//! Client for the MinRUE inference backend.
//!
//! MinRUE accepts a file upload for processing, returns an opaque job id,
//! and exposes the job's lifecycle through `GET /results/{job_id}`. The
//! service runs locally and takes no authentication.

use crate::client::HttpClient;
use crate::models::{FlowgateError, JobSnapshot, JobStatus, MinRueConfig, Result};
use crate::poll::{poll_job, PollSettings};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// A job accepted by MinRUE.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedJob {
    pub job_id: String,
}

/// Wire shape of `GET /results/{job_id}`.
#[derive(Debug, Deserialize)]
struct JobResultResponse {
    status: String,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the MinRUE backend API.
pub struct MinRueClient {
    http: HttpClient,
}

impl MinRueClient {
    /// Create a client from configuration.
    pub fn new(config: &MinRueConfig) -> Result<Self> {
        let http = HttpClient::new(
            "minrue".to_string(),
            None,
            config.base_url.clone(),
            HashMap::new(),
            config.timeout_secs,
            config.max_retries,
        )?;
        Ok(Self { http })
    }

    /// Check service health.
    pub async fn health(&self) -> Result<Value> {
        self.http.get_json("health").await
    }

    /// List available models.
    pub async fn list_models(&self) -> Result<Value> {
        self.http.get_json("models").await
    }

    /// List supported task types.
    pub async fn list_tasks(&self) -> Result<Value> {
        self.http.get_json("tasks").await
    }

    /// Upload a file for processing.
    ///
    /// Returns the job id assigned by the service; the caller observes the
    /// job through [`job_status`](Self::job_status) or waits with
    /// [`wait_for_result`](Self::wait_for_result).
    pub async fn submit(
        &self,
        file_path: &Path,
        model: &str,
        task: &str,
        parameters: &Value,
    ) -> Result<SubmittedJob> {
        let bytes = tokio::fs::read(file_path)
            .await
            .map_err(|e| FlowgateError::io(format!("reading {}", file_path.display()), e))?;

        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                FlowgateError::InvalidInput(format!("not a file path: {}", file_path.display()))
            })?;

        let model = model.to_string();
        let task = task.to_string();
        let parameters = serde_json::to_string(parameters)
            .map_err(|e| FlowgateError::Internal(format!("serializing parameters: {e}")))?;

        let job: SubmittedJob = self
            .http
            .post_multipart("process", || {
                Form::new()
                    .part("file", Part::bytes(bytes.clone()).file_name(file_name.clone()))
                    .text("model", model.clone())
                    .text("task", task.clone())
                    .text("parameters", parameters.clone())
            })
            .await?;

        info!(job_id = %job.job_id, file = %file_path.display(), "Submitted file for processing");
        Ok(job)
    }

    /// Read the current status of a job.
    pub async fn job_status(&self, job_id: &str) -> Result<JobSnapshot> {
        let result: JobResultResponse = self.http.get_json(&format!("results/{job_id}")).await?;

        let mut snapshot = JobSnapshot::new(job_id, JobStatus::parse(&result.status));
        snapshot.output = result.output;
        snapshot.error = result.error;
        Ok(snapshot)
    }

    /// Poll the job until it reaches a terminal status or the deadline
    /// passes. On success the returned snapshot carries the output payload.
    pub async fn wait_for_result(
        &self,
        job_id: &str,
        settings: PollSettings,
    ) -> Result<JobSnapshot> {
        poll_job(job_id, || self.job_status(job_id), settings).await
    }
}
