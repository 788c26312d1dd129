// Port Layer - Interfaces for external dependencies

pub mod broker;
pub mod execution;
pub mod id_provider; // For deterministic testing
pub mod time_provider;

// Re-exports
pub use broker::memory::InMemoryBroker;
pub use broker::{
    wait_deadline, BlockingGet, Broker, StateSnapshot, TaskConsumer, TaskMessage,
    MAX_BLOCKING_WAIT,
};
pub use execution::{ExecutionContext, ExecutionError, ExecutionFunction};
pub use id_provider::{IdProvider, SequentialIdProvider, UuidProvider};
pub use time_provider::{ManualTimeProvider, SystemTimeProvider, TimeProvider};
