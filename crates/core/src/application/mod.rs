// Application Layer - Use Cases and Business Logic

pub mod gateway;
pub mod recovery;
pub mod retention;
pub mod retry;
pub mod runner;
pub mod worker;

// Re-exports
pub use gateway::{GatewayConfig, JobGateway, WaitOutcome};
pub use recovery::RecoveryService;
pub use retention::RetentionScheduler;
pub use retry::{RetryDecision, RetryPolicy};
pub use runner::{
    run_with_policy, AttemptObserver, NoopObserver, RunOutcome, TaskPolicy, TimeoutPolicy,
    HARD_TIMEOUT_BUFFER,
};
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker};
