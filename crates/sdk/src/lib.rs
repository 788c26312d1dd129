//! JD Match SDK - Rust Client Library
//!
//! Provides a typed client for the JD Match daemon's JSON-RPC API.
//!
//! # Example
//!
//! ```no_run
//! use jdmatch_sdk::JdMatchClient;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JdMatchClient::connect("http://127.0.0.1:9633").await?;
//!
//!     let job = client.submit("match", "Senior Rust engineer...", "We need Rust...").await?;
//!     let result = client
//!         .wait_with_progress(&job.job_id, Duration::from_secs(120), Duration::from_millis(1500), |elapsed, status| {
//!             println!("{:>5.1}s {}", elapsed.as_secs_f64(), status);
//!         })
//!         .await?;
//!
//!     println!("Job {} finished: {}", result.job_id, result.status);
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::{JdMatchClient, DEFAULT_POLL_INTERVAL, DEFAULT_TOTAL_WAIT};
pub use error::{Result, SdkError};
pub use types::{
    Artifact, HealthResponse, JobResult, JobStatus, SubmitRequest, SubmitResponse, WarmupResponse,
};
