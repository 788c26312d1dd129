//! JD Match CLI - Command-line interface for the JD Match job engine

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9633";

#[derive(Parser)]
#[command(name = "jdmatch")]
#[command(about = "JD Match job engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "JDMATCH_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job
    Submit {
        /// Job type: match, enhance or cover_letter
        #[arg(short, long)]
        job_type: String,

        /// Resume as a UTF-8 text file
        #[arg(short, long)]
        resume: PathBuf,

        /// Job description as a UTF-8 text file
        #[arg(short = 'd', long)]
        jd: PathBuf,

        /// Block until the job finishes (seconds)
        #[arg(short, long)]
        wait: Option<f64>,
    },

    /// Show job status
    Status {
        /// Job ID
        job_id: String,
    },

    /// Show the current job snapshot
    #[command(name = "result")]
    Show {
        /// Job ID
        job_id: String,
    },

    /// Block until the job finishes or the timeout elapses
    Wait {
        /// Job ID
        job_id: String,

        /// Seconds to wait (daemon default when omitted)
        #[arg(short, long)]
        timeout: Option<f64>,
    },

    /// Download the rendered result
    Download {
        /// Job ID
        job_id: String,

        /// md, json or pdf
        #[arg(short, long, default_value = "md")]
        format: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Preload the model
    Warmup {
        /// Wait for the preload to finish (seconds)
        #[arg(short, long)]
        wait: Option<f64>,
    },

    /// Check the daemon
    Health,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize, Tabled)]
struct SubmitResult {
    job_id: String,
    status: String,
}

#[derive(Deserialize, Tabled)]
struct StatusRow {
    job_id: String,
    status: String,
    #[tabled(display_with = "display_info")]
    info: Option<Value>,
}

fn display_info(info: &Option<Value>) -> String {
    match info {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

#[derive(Deserialize)]
struct JobResult {
    job_id: String,
    status: String,
    result: Option<Value>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct Artifact {
    filename: String,
    content_type: String,
    encoding: String,
    content: String,
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        match error.data {
            Some(data) => anyhow::bail!("RPC error ({}): {} {}", error.code, error.message, data),
            None => anyhow::bail!("RPC error ({}): {}", error.code, error.message),
        }
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn colored_status(status: &str) -> String {
    match status {
        "SUCCESS" => status.green().bold().to_string(),
        "FAILURE" | "REVOKED" => status.red().bold().to_string(),
        "PENDING" | "RECEIVED" => status.yellow().to_string(),
        _ => status.cyan().to_string(),
    }
}

fn print_job_result(result: &JobResult) -> Result<()> {
    println!("  {} {}", "Job:".bold(), result.job_id);
    println!("  {} {}", "Status:".bold(), colored_status(&result.status));

    if let Some(error) = &result.error {
        println!("  {} {}", "Error:".bold(), error.red());
    }

    if let Some(document) = &result.result {
        println!();
        // Markdown bodies print as-is; anything else as JSON
        let body = ["resume_enhancement_md", "cover_letter_md"]
            .iter()
            .find_map(|key| document.get(*key).and_then(Value::as_str).map(str::to_string));
        match body {
            Some(markdown) => println!("{}", markdown),
            None => println!("{}", serde_json::to_string_pretty(document)?),
        }
    }
    Ok(())
}

async fn wait_for(url: &str, method: &str, job_id: &str, timeout: Option<f64>) -> Result<JobResult> {
    let mut params = json!({ "job_id": job_id });
    if let Some(timeout) = timeout {
        params["timeout"] = json!(timeout);
    }
    let result = call_rpc(url, method, params).await?;
    Ok(serde_json::from_value(result)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            job_type,
            resume,
            jd,
            wait,
        } => {
            let params = json!({
                "job_type": job_type,
                "resume": read_text(&resume)?,
                "jd": read_text(&jd)?,
            });

            let result = call_rpc(&cli.rpc_url, "job.submit.v1", params).await?;
            let submitted: SubmitResult = serde_json::from_value(result)?;
            let job_id = submitted.job_id.clone();

            println!("{}", "✓ Job submitted successfully".green().bold());
            println!();
            println!("{}", Table::new(vec![submitted]));

            if let Some(timeout) = wait {
                println!();
                println!("{}", format!("Waiting up to {}s...", timeout).cyan());
                let result = wait_for(&cli.rpc_url, "job.wait.v1", &job_id, Some(timeout)).await?;
                print_job_result(&result)?;
            }
        }

        Commands::Status { job_id } => {
            let result = call_rpc(&cli.rpc_url, "job.status.v1", json!({ "job_id": job_id })).await?;
            let row: StatusRow = serde_json::from_value(result)?;
            println!("{}", Table::new(vec![row]));
        }

        Commands::Show { job_id } => {
            let result = call_rpc(&cli.rpc_url, "job.result.v1", json!({ "job_id": job_id })).await?;
            print_job_result(&serde_json::from_value(result)?)?;
        }

        Commands::Wait { job_id, timeout } => {
            let result = wait_for(&cli.rpc_url, "job.wait.v1", &job_id, timeout).await?;
            print_job_result(&result)?;
        }

        Commands::Download {
            job_id,
            format,
            output,
        } => {
            let params = json!({ "job_id": job_id, "format": format });
            let result = call_rpc(&cli.rpc_url, "job.download.v1", params).await?;
            let artifact: Artifact = serde_json::from_value(result)?;

            let bytes = match artifact.encoding.as_str() {
                "base64" => STANDARD
                    .decode(artifact.content.as_bytes())
                    .context("Invalid base64 artifact")?,
                _ => artifact.content.into_bytes(),
            };

            std::fs::create_dir_all(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let path = output.join(&artifact.filename);
            std::fs::write(&path, &bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;

            println!(
                "{} {} ({}, {} bytes)",
                "✓ Saved".green().bold(),
                path.display(),
                artifact.content_type,
                bytes.len()
            );
        }

        Commands::Warmup { wait } => {
            let result = call_rpc(&cli.rpc_url, "warmup.submit.v1", json!({})).await?;
            let job_id = result["job_id"].as_str().unwrap_or_default().to_string();
            println!("{} {}", "✓ Warmup submitted:".green().bold(), job_id);

            if let Some(timeout) = wait {
                let result = wait_for(&cli.rpc_url, "warmup.wait.v1", &job_id, Some(timeout)).await?;
                print_job_result(&result)?;
            }
        }

        Commands::Health => {
            println!("{}", "Daemon Health".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "health.v1", json!({})).await {
                Ok(health) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!("  {} {}", "Version:".bold(), health["version"]);
                    println!("  {} {}", "Warmup:".bold(), health["warmup_enabled"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}
