//! Remote job lifecycle types.
//!
//! A job is created and owned by an external service; this crate only
//! observes it through repeated status reads. A snapshot is never mutated
//! locally, and a terminal snapshot re-read later returns the same state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a remote job.
///
/// The two backends use slightly different vocabulary (MinRUE reports
/// `processing`, RAGFlow traces report `running`); both map to `Running`.
/// Anything unrecognized is kept verbatim in `Other` and treated as
/// non-terminal, so a new server-side status never crashes a poll loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Other(String),
}

impl JobStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Parse a wire status string, case-insensitively.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Self::Pending,
            "running" | "processing" => Self::Running,
            "completed" | "done" | "success" => Self::Completed,
            "failed" | "error" => Self::Failed,
            _ => Self::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One observation of a remote job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Opaque identifier assigned by the remote service at submission.
    pub id: String,
    /// Status at observation time.
    pub status: JobStatus,
    /// Result payload; present only when status is `Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error description; present only when status is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When this snapshot was taken.
    pub observed_at: DateTime<Utc>,
}

impl JobSnapshot {
    /// Build a snapshot observed now.
    pub fn new(id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            id: id.into(),
            status,
            output: None,
            error: None,
            observed_at: Utc::now(),
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// The failure reason to surface to callers; the remote service does
    /// not always populate one.
    pub fn failure_reason(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "remote service reported failure without detail".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(JobStatus::parse("pending"), JobStatus::Pending);
        assert_eq!(JobStatus::parse("PROCESSING"), JobStatus::Running);
        assert_eq!(JobStatus::parse("running"), JobStatus::Running);
        assert_eq!(JobStatus::parse("Completed"), JobStatus::Completed);
        assert_eq!(JobStatus::parse("failed"), JobStatus::Failed);
        assert_eq!(
            JobStatus::parse("finalizing"),
            JobStatus::Other("finalizing".to_string())
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        // Unknown vocabulary is non-terminal: keep polling, never crash.
        assert!(!JobStatus::Other("finalizing".to_string()).is_terminal());
    }

    #[test]
    fn test_snapshot_deserializes_wire_status() {
        let snap: JobSnapshot = serde_json::from_str(
            r#"{"id":"job-42","status":"processing","observed_at":"2026-01-10T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(snap.status, JobStatus::Running);
        assert!(snap.output.is_none());
    }
}
