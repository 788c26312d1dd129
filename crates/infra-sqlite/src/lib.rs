// JD Match Infrastructure - SQLite Adapter
// Implements: Broker + TaskConsumer (durable queues and result store)

mod broker;
mod connection;
mod migration;

pub use broker::SqliteBroker;
pub use connection::create_pool;
pub use migration::run_migrations;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
