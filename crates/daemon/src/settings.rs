//! Daemon settings
//!
//! Read once at startup from `JDMATCH_*` environment variables, validated,
//! then handed to constructors by value.

use anyhow::{bail, Context, Result};
use config::{Config, Environment};
use jdmatch_api_rpc::server::{RpcServerConfig, DEFAULT_RPC_HOST, DEFAULT_RPC_PORT};
use jdmatch_core::application::retry::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_MS, DEFAULT_JITTER, DEFAULT_MAX_RETRIES,
};
use jdmatch_core::application::worker::constants::DEFAULT_WORKER_CONCURRENCY;
use jdmatch_core::application::{GatewayConfig, RetryPolicy, TaskPolicy, TimeoutPolicy};
use jdmatch_infra_pipeline::PipelineCommand;
use serde::Deserialize;
use std::time::Duration;

pub const ENV_PREFIX: &str = "JDMATCH";
pub const DEFAULT_BROKER_URL: &str = "sqlite://~/.jdmatch/broker.db";
const MEMORY_BROKER_URL: &str = "memory://";

/// Raw values as they appear in the environment
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawSettings {
    broker_url: String,
    max_retries: u32,
    retry_backoff_ms: u64,
    retry_backoff_max_ms: u64,
    retry_jitter: f64,
    soft_time_limit_secs: u64,
    hard_time_limit_secs: Option<u64>,
    default_wait_timeout_secs: u64,
    warmup_enabled: bool,
    worker_concurrency: usize,
    pipeline_command: Option<String>,
    pipeline_args: String,
    result_expires_hours: u64,
    recovery_window_secs: Option<u64>,
    rpc_host: String,
    rpc_port: u16,
    log_format: LogFormat,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_BACKOFF_BASE_MS,
            retry_backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            retry_jitter: DEFAULT_JITTER,
            soft_time_limit_secs: 600,
            hard_time_limit_secs: None,
            default_wait_timeout_secs: 30,
            warmup_enabled: true,
            worker_concurrency: DEFAULT_WORKER_CONCURRENCY,
            pipeline_command: None,
            pipeline_args: String::new(),
            result_expires_hours: 24,
            recovery_window_secs: None,
            rpc_host: DEFAULT_RPC_HOST.to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            log_format: LogFormat::Pretty,
        }
    }
}

/// Console log encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for development
    Pretty,
    /// One JSON object per line, for production
    Json,
}

/// Where jobs and results live
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerLocation {
    /// Process-local; lost on restart
    Memory,
    /// sqlx connection URL of a SQLite file
    Sqlite(String),
}

impl BrokerLocation {
    pub fn parse(url: &str) -> Result<Self> {
        if url == MEMORY_BROKER_URL {
            return Ok(Self::Memory);
        }
        match url.strip_prefix("sqlite://") {
            Some(path) if !path.is_empty() => {
                let path = shellexpand::tilde(path).into_owned();
                Ok(Self::Sqlite(format!("sqlite://{}", path)))
            }
            _ => bail!(
                "Unsupported broker URL '{}' (expected sqlite://<path> or memory://)",
                url
            ),
        }
    }
}

/// Validated daemon settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub broker: BrokerLocation,
    pub task_policy: TaskPolicy,
    pub gateway: GatewayConfig,
    pub worker_concurrency: usize,
    pub pipeline: Option<PipelineCommand>,
    /// Zero keeps results forever
    pub result_expires: Duration,
    /// Age after which a running daemon requeues a reservation
    pub recovery_window: Duration,
    pub rpc: RpcServerConfig,
    pub log_format: LogFormat,
}

impl Settings {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(Environment::with_prefix(ENV_PREFIX))
    }

    fn from_environment(source: Environment) -> Result<Self> {
        let raw: RawSettings = Config::builder()
            .add_source(source.try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        raw.validate()
    }
}

impl RawSettings {
    fn validate(self) -> Result<Settings> {
        if !(0.0..=1.0).contains(&self.retry_jitter) {
            bail!("JDMATCH_RETRY_JITTER must be within [0, 1], got {}", self.retry_jitter);
        }
        if self.retry_backoff_max_ms < self.retry_backoff_ms {
            bail!("JDMATCH_RETRY_BACKOFF_MAX_MS must not be below JDMATCH_RETRY_BACKOFF_MS");
        }
        if self.worker_concurrency == 0 {
            bail!("JDMATCH_WORKER_CONCURRENCY must be at least 1");
        }

        let timeout = TimeoutPolicy::new(
            Duration::from_secs(self.soft_time_limit_secs),
            self.hard_time_limit_secs.map(Duration::from_secs),
        )?;

        let pipeline = self
            .pipeline_command
            .filter(|command| !command.trim().is_empty())
            .map(|command| {
                let args = self
                    .pipeline_args
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                PipelineCommand::new(command.trim(), args)
            });

        let task_policy = TaskPolicy {
            retry: RetryPolicy {
                max_retries: self.max_retries,
                backoff_base: Duration::from_millis(self.retry_backoff_ms),
                backoff_max: Duration::from_millis(self.retry_backoff_max_ms),
                jitter: self.retry_jitter,
            },
            timeout,
        };
        let recovery_window = self
            .recovery_window_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| task_policy.max_job_lifetime());

        let result_expires = self
            .result_expires_hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .with_context(|| {
                format!(
                    "JDMATCH_RESULT_EXPIRES_HOURS is too large: {}",
                    self.result_expires_hours
                )
            })?;

        Ok(Settings {
            broker: BrokerLocation::parse(&self.broker_url)?,
            task_policy,
            gateway: GatewayConfig {
                default_wait_timeout: Duration::from_secs(self.default_wait_timeout_secs),
                warmup_enabled: self.warmup_enabled,
            },
            worker_concurrency: self.worker_concurrency,
            pipeline,
            result_expires,
            recovery_window,
            rpc: RpcServerConfig {
                host: self.rpc_host,
                port: self.rpc_port,
            },
            log_format: self.log_format,
        })
    }
}
