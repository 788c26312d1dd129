//! Simple SDK Example
//!
//! Submits a match job, follows it to completion and saves the Markdown report.
//!
//! # Usage
//!
//! 1. Start the daemon:
//!    ```bash
//!    cargo run --package jdmatch-daemon
//!    ```
//!
//! 2. Run this example:
//!    ```bash
//!    cargo run --example simple
//!    ```

use jdmatch_sdk::{JdMatchClient, DEFAULT_POLL_INTERVAL, DEFAULT_TOTAL_WAIT};

const RESUME: &str = "Backend engineer. Five years of Python and Rust, PostgreSQL, Kubernetes.";
const JD: &str = "We are hiring a backend engineer with Rust, PostgreSQL and AWS experience.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("JD Match SDK - Simple Example");
    println!("=============================\n");

    // 1. Connect to daemon
    println!("1. Connecting to daemon...");
    let client = JdMatchClient::connect("http://127.0.0.1:9633").await?;
    let health = client.health().await?;
    println!("   ✓ Connected (daemon {})\n", health.version);

    // 2. Submit a job
    println!("2. Submitting a match job...");
    let job = client.submit("match", RESUME, JD).await?;
    println!("   ✓ Job submitted:");
    println!("     - ID: {}", job.job_id);
    println!("     - Status: {}\n", job.status);

    // 3. Follow progress
    println!("3. Waiting for the result...");
    let result = client
        .wait_with_progress(&job.job_id, DEFAULT_TOTAL_WAIT, DEFAULT_POLL_INTERVAL, |elapsed, status| {
            println!("     {:>5.1}s  {}", elapsed.as_secs_f64(), status);
        })
        .await?;

    match result.status.as_str() {
        "SUCCESS" => println!("   ✓ Finished\n"),
        "FAILURE" => {
            println!("   ✗ Failed: {}", result.error.unwrap_or_default());
            return Ok(());
        }
        other => {
            println!("   ⚠ Still {} after the polling budget", other);
            return Ok(());
        }
    }

    // 4. Download the report
    println!("4. Downloading the Markdown report...");
    let artifact = client.download(&job.job_id, "md").await?;
    std::fs::write(&artifact.filename, artifact.bytes()?)?;
    println!("   ✓ Saved {}", artifact.filename);

    println!("\n✓ Example completed successfully!");

    Ok(())
}
