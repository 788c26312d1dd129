//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over HTTP on a TCP listener.

use crate::handler::RpcHandler;
use crate::types::{parse_params, DownloadRequest, JobIdRequest, SubmitRequest, WaitRequest};
use jdmatch_core::application::JobGateway;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9633;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, gateway: Arc<JobGateway>) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(gateway)),
        }
    }

    /// Start the JSON-RPC server
    ///
    /// Returns the bound address (useful with port 0) and the server handle.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("job.submit.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: SubmitRequest = parse_params(params)?;
                    handler.submit(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.status.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobIdRequest = parse_params(params)?;
                    handler.status(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.result.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobIdRequest = parse_params(params)?;
                    handler.result(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.wait.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: WaitRequest = parse_params(params)?;
                    handler.wait(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.download.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: DownloadRequest = parse_params(params)?;
                    handler.download(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        // Model preload
        let handler = self.handler.clone();
        module
            .register_async_method("warmup.submit.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.submit_warmup().await }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("warmup.wait.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: WaitRequest = parse_params(params)?;
                    handler.wait_warmup(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("health.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.health().await }
            })
            .map_err(|e| e.to_string())?;

        info!(addr = %local_addr, "JSON-RPC server started");

        let handle = server.start(module);
        Ok((local_addr, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HealthResponse, SubmitResponse};
    use jdmatch_core::application::GatewayConfig;
    use jdmatch_core::domain::JobResult;
    use jdmatch_core::port::InMemoryBroker;
    use jsonrpsee::core::client::ClientT;
    use jsonrpsee::http_client::HttpClientBuilder;
    use jsonrpsee::rpc_params;
    use serde_json::json;

    async fn start() -> (SocketAddr, ServerHandle) {
        let gateway = Arc::new(JobGateway::new(
            Arc::new(InMemoryBroker::new()),
            GatewayConfig::default(),
        ));
        let config = RpcServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        };
        RpcServer::new(config, gateway).start().await.unwrap()
    }

    #[tokio::test]
    async fn test_health_over_http() {
        let (addr, handle) = start().await;
        let client = HttpClientBuilder::default()
            .build(format!("http://{}", addr))
            .unwrap();

        let health: HealthResponse = client.request("health.v1", rpc_params![]).await.unwrap();
        assert_eq!(health.status, "ok");

        handle.stop().unwrap();
    }

    #[tokio::test]
    async fn test_submit_and_wait_over_http() {
        let (addr, handle) = start().await;
        let client = HttpClientBuilder::default()
            .build(format!("http://{}", addr))
            .unwrap();

        let submitted: SubmitResponse = client
            .request(
                "job.submit.v1",
                rpc_params![json!({"job_type": "match", "resume": "r", "jd": "d"})],
            )
            .await
            .unwrap();

        let waited: JobResult = client
            .request(
                "job.wait.v1",
                rpc_params![json!({"job_id": submitted.job_id, "timeout": 0.05})],
            )
            .await
            .unwrap();
        assert!(!waited.is_terminal());
        assert!(waited.error.unwrap().starts_with("Timed out"));

        handle.stop().unwrap();
    }
}
