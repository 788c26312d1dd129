//! JSON-RPC API Layer
//!
//! JSON-RPC 2.0 surface over the job gateway: submit, status, result,
//! bounded wait, artifact download and model warmup.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
