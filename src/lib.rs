//! flowgate - async client toolkit for MinRUE and RAGFlow backends.
//!
//! ## Architecture
//!
//! Two HTTP clients share one transport and one waiting strategy:
//! - **MinRUE**: local inference backend - submit a file, poll the job,
//!   collect the output.
//! - **RAGFlow**: RAG service - chat completions, dataset and document
//!   management, knowledge-graph and RAPTOR builds with polled progress.
//!
//! The shared pieces carry the design weight:
//! - [`client::HttpClient`]: bounded retry with exponential backoff around
//!   every outbound call.
//! - [`poll::poll_job`]: one deadline-bounded poll loop for every remote
//!   job, instead of a sleep-and-retry copy per integration.
//! - [`poll::BatchPoller`]: semaphore-bounded concurrent polls.

pub mod client;
pub mod models;
pub mod poll;

// Re-exports for convenience
pub use client::{HttpClient, MinRueClient, RagflowClient};
pub use models::{Config, FlowgateError, JobSnapshot, JobStatus, Result};
pub use poll::{poll_job, BatchPoller, PollSettings};
