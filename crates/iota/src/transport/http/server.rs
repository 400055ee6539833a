//! HTTP server implementation.

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::service::EndpointService;
use crate::signal::shutdown_signal;

use super::routes::routes;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Start the HTTP server and run until SIGINT/SIGTERM.
pub async fn serve(config: ServerConfig, service: Arc<EndpointService>) -> anyhow::Result<()> {
    let listener = bind(&config).await?;
    serve_with_shutdown(listener, service, shutdown_signal()).await
}

/// Bind `host:port`; the host may be a name, an IPv4 or a bare IPv6 address.
async fn bind(config: &ServerConfig) -> io::Result<TcpListener> {
    TcpListener::bind((config.host.as_str(), config.port)).await
}

/// Serve on `listener` until `shutdown` resolves, then stop every worker.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    service: Arc<EndpointService>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = routes(service.clone());
    let actual_addr = listener.local_addr()?;

    info!("Starting iota server on {}", actual_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");

    service.shutdown().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::build::BuildConfig;
    use crate::orchestrator::{OrchestratorConfig, spawn_coordinator};

    #[test]
    fn server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
    }

    #[tokio::test]
    async fn bind_accepts_host_names() {
        let config = ServerConfig {
            host: "localhost".to_string(),
            port: 0,
        };
        let listener = bind(&config).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn bind_accepts_bare_ipv6_hosts() {
        // Hosts without IPv6 loopback have nothing to check.
        if std::net::TcpListener::bind("[::1]:0").is_err() {
            return;
        }
        let config = ServerConfig {
            host: "::1".to_string(),
            port: 0,
        };
        let listener = bind(&config).await.unwrap();
        assert!(listener.local_addr().unwrap().is_ipv6());
    }

    #[tokio::test]
    async fn shutdown_stops_server_and_coordinator() {
        let root = tempfile::tempdir().unwrap();
        let config = OrchestratorConfig::new(root.path());
        let coordinator = spawn_coordinator(&config, config.executable_supervisor());
        let service = Arc::new(EndpointService::new(
            coordinator.clone(),
            root.path(),
            BuildConfig::default(),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve_with_shutdown(listener, service, async {
            let _ = stop_rx.await;
        }));

        let mut socket = tokio::net::TcpStream::connect(addr).await.unwrap();
        socket
            .write_all(b"GET /health-check HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        socket.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert!(coordinator.snapshot().await.is_err());
    }
}
