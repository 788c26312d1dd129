//! JD Match daemon - composition root
//!
//! Wires the broker, the Execution Function, workers, recovery, retention
//! and the JSON-RPC surface, then runs until Ctrl+C.

mod settings;
mod telemetry;

use anyhow::{Context, Result};
use settings::{BrokerLocation, LogFormat, Settings};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use jdmatch_api_rpc::RpcServer;
use jdmatch_core::application::worker::constants::{
    RECOVERY_SWEEP_INTERVAL, RETENTION_SWEEP_INTERVAL,
};
use jdmatch_core::application::{
    shutdown_channel, JobGateway, RecoveryService, RetentionScheduler, ShutdownSender, Worker,
};
use jdmatch_core::domain::queue::DEFAULT_QUEUES;
use jdmatch_core::port::{
    Broker, ExecutionFunction, InMemoryBroker, SystemTimeProvider, TaskConsumer, TimeProvider,
    UuidProvider,
};
use jdmatch_infra_pipeline::{StubPipeline, SubprocessPipeline};
use jdmatch_infra_sqlite::{create_pool, run_migrations, SqliteBroker};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LOG_FILTER: &str = "jdmatch=info";
/// Time given to in-flight jobs after Ctrl+C
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is normal outside development
    let _ = dotenvy::dotenv();
    let settings = Settings::load()?;
    init_logging(settings.log_format)?;
    info!("JD Match daemon v{} starting...", VERSION);
    telemetry::report();

    info!(
        broker = ?settings.broker,
        workers = settings.worker_concurrency,
        soft_limit_secs = settings.task_policy.timeout.soft().as_secs(),
        hard_limit_secs = settings.task_policy.timeout.hard().as_secs(),
        max_retries = settings.task_policy.retry.max_retries,
        recovery_window_secs = settings.recovery_window.as_secs(),
        "Configuration loaded"
    );

    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let (broker, consumer) = open_broker(&settings.broker, time_provider.clone()).await?;
    let execution = build_pipeline(&settings);

    // No worker of ours has reserved anything yet: every reservation is orphaned
    let recovery = RecoveryService::new(
        consumer.clone(),
        time_provider.clone(),
        settings.recovery_window,
    );
    match recovery.recover_all_reservations().await {
        Ok(count) => info!(recovered_jobs = count, "Crash recovery completed"),
        Err(e) => error!(error = %e, "Crash recovery failed"),
    }

    let (shutdown_tx, _) = shutdown_channel();
    let workers = spawn_workers(&settings, &shutdown_tx, consumer.clone(), execution);
    tokio::spawn(recovery.run(RECOVERY_SWEEP_INTERVAL, shutdown_tx.subscribe()));

    if settings.result_expires.is_zero() {
        info!("Result retention disabled (results kept forever)");
    } else {
        let retention = RetentionScheduler::new(
            consumer.clone(),
            time_provider.clone(),
            settings.result_expires,
            RETENTION_SWEEP_INTERVAL,
        );
        tokio::spawn(retention.run(shutdown_tx.subscribe()));
    }

    let gateway = Arc::new(JobGateway::new(broker, settings.gateway.clone()));

    if settings.gateway.warmup_enabled {
        match gateway.submit_warmup().await {
            Ok(job_id) => info!(job_id = %job_id, "Startup warmup submitted"),
            Err(e) => warn!(error = %e, "Startup warmup could not be submitted"),
        }
    }

    let (addr, rpc_handle) = RpcServer::new(settings.rpc.clone(), gateway)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(addr = %addr, "System ready. Waiting for jobs...");
    info!("Press Ctrl+C to shutdown");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received. Exiting gracefully...");

    shutdown_tx.shutdown();
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }
    for worker in workers {
        if tokio::time::timeout(SHUTDOWN_GRACE, worker).await.is_err() {
            warn!("Worker did not stop within the grace period; its job will be recovered");
        }
    }
    telemetry::shutdown();

    info!("Shutdown complete.");
    Ok(())
}

fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .context("Failed to create env filter")?;

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(telemetry::layer()?)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

async fn open_broker(
    location: &BrokerLocation,
    time_provider: Arc<dyn TimeProvider>,
) -> Result<(Arc<dyn Broker>, Arc<dyn TaskConsumer>)> {
    match location {
        BrokerLocation::Memory => {
            warn!("Using in-memory broker: jobs are lost on restart");
            let broker = Arc::new(InMemoryBroker::new());
            Ok((broker.clone(), broker))
        }
        BrokerLocation::Sqlite(url) => {
            if let Some(parent) = url
                .strip_prefix("sqlite://")
                .and_then(|path| std::path::Path::new(path).parent())
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }

            info!(url = %url, "Initializing broker database...");
            let pool = create_pool(url).await.context("DB pool creation failed")?;
            run_migrations(&pool).await.context("Migration failed")?;

            let broker = Arc::new(SqliteBroker::new(pool, Arc::new(UuidProvider), time_provider));
            Ok((broker.clone(), broker))
        }
    }
}

fn build_pipeline(settings: &Settings) -> Arc<dyn ExecutionFunction> {
    match &settings.pipeline {
        Some(command) => {
            info!(program = %command.program, args = ?command.args, "Using subprocess pipeline");
            Arc::new(SubprocessPipeline::new(command.clone()))
        }
        None => {
            warn!("JDMATCH_PIPELINE_COMMAND not set; using the stub pipeline");
            Arc::new(StubPipeline::new())
        }
    }
}

fn spawn_workers(
    settings: &Settings,
    shutdown_tx: &ShutdownSender,
    consumer: Arc<dyn TaskConsumer>,
    execution: Arc<dyn ExecutionFunction>,
) -> Vec<JoinHandle<()>> {
    let queues: Vec<String> = DEFAULT_QUEUES.iter().map(|q| q.to_string()).collect();
    let policy = Arc::new(settings.task_policy.clone());

    (0..settings.worker_concurrency)
        .map(|index| {
            let worker = Worker::new(
                queues.clone(),
                consumer.clone(),
                execution.clone(),
                policy.clone(),
            );
            let shutdown = shutdown_tx.subscribe();
            tokio::spawn(async move {
                if let Err(e) = worker.run(shutdown).await {
                    error!(worker = index, error = %e, "Worker failed");
                }
            })
        })
        .collect()
}
