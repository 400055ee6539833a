//! Worker runtime - the worker side of the RPC protocol.
//!
//! Lets an endpoint be written in Rust: a binary parses [`WorkerArgs`], then
//! hands its handler to [`run_worker`], which serves `Iotasvc.ServeHttp` on
//! the given port until SIGINT/SIGTERM. Wire-compatible with the generated Go
//! workers, so the orchestrator cannot tell the two apart.
//!
//! Requests on one connection are answered in order; connections are served
//! concurrently.

use std::future::Future;
use std::io;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::JsonLinesCodec;
use crate::bridge::protocol::{RpcRequest, RpcResponse, SERVICE_METHOD};
use crate::rpc::WORKER_HOST;

/// Command line every worker executable accepts.
#[derive(Debug, Clone, clap::Parser)]
#[command(about = "iota endpoint worker")]
pub struct WorkerArgs {
    /// Port to serve RPC calls on.
    #[arg(long)]
    pub port: u16,
}

/// The user function behind a worker: one string in, one string out.
#[async_trait::async_trait]
pub trait EndpointHandler: Send + Sync + 'static {
    /// `Err` is reported to the caller as an application error.
    async fn serve(&self, argument: String) -> Result<String, String>;
}

#[async_trait::async_trait]
impl<F> EndpointHandler for F
where
    F: Fn(String) -> Result<String, String> + Send + Sync + 'static,
{
    async fn serve(&self, argument: String) -> Result<String, String> {
        self(argument)
    }
}

/// Bind loopback on `args.port` and serve until a shutdown signal.
pub async fn run_worker<H: EndpointHandler>(handler: Arc<H>, args: WorkerArgs) -> io::Result<()> {
    let listener = TcpListener::bind((WORKER_HOST, args.port)).await?;
    tracing::info!(target: "iota::worker", addr = %listener.local_addr()?, "Worker listening");
    serve(listener, handler, crate::signal::shutdown_signal()).await
}

/// Serve connections from `listener` until `shutdown` resolves.
pub async fn serve<H, F>(listener: TcpListener, handler: Arc<H>, shutdown: F) -> io::Result<()>
where
    H: EndpointHandler,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(target: "iota::worker", "Worker shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        tracing::trace!(target: "iota::worker", %peer, "Accepted connection");
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(socket, handler).await {
                                tracing::debug!(target: "iota::worker", %peer, error = %e, "Connection closed with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(target: "iota::worker", error = %e, "Accept failed");
                    }
                }
            }
        }
    }
}

async fn serve_connection<H: EndpointHandler>(socket: TcpStream, handler: Arc<H>) -> io::Result<()> {
    let (read_half, write_half) = socket.into_split();
    let mut reader = FramedRead::new(read_half, JsonLinesCodec::<RpcRequest>::new());
    let mut writer = FramedWrite::new(write_half, JsonLinesCodec::<RpcResponse>::new());

    while let Some(request) = reader.next().await {
        let request = request?;
        let response = dispatch(handler.as_ref(), request).await;
        writer.send(response).await?;
    }
    Ok(())
}

async fn dispatch<H: EndpointHandler>(handler: &H, request: RpcRequest) -> RpcResponse {
    let id = request.id;
    if request.method != SERVICE_METHOD {
        return RpcResponse::err(id, format!("rpc: can't find method {}", request.method));
    }
    let Some(argument) = request.argument() else {
        return RpcResponse::err(id, "rpc: expected exactly one string parameter");
    };

    match handler.serve(argument.to_string()).await {
        Ok(result) => RpcResponse::ok(id, result),
        Err(message) => RpcResponse::err(id, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn greet(name: String) -> Result<String, String> {
        if name.is_empty() {
            return Err("name must not be empty".to_string());
        }
        Ok(format!("hello {name}"))
    }

    async fn start(handler: impl EndpointHandler) -> (u16, tokio::sync::oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(serve(listener, Arc::new(handler), async {
            let _ = stop_rx.await;
        }));
        (port, stop_tx)
    }

    async fn exchange(port: u16, lines: &[&str]) -> Vec<RpcResponse> {
        let socket = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (r, mut w) = socket.into_split();
        for line in lines {
            w.write_all(line.as_bytes()).await.unwrap();
            w.write_all(b"\n").await.unwrap();
        }
        let mut reader = BufReader::new(r);
        let mut out = Vec::new();
        for _ in lines {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            out.push(serde_json::from_str(&line).unwrap());
        }
        out
    }

    #[test]
    fn worker_args_parse_port() {
        let args = WorkerArgs::try_parse_from(["endpoint", "--port", "9001"]).unwrap();
        assert_eq!(args.port, 9001);

        assert!(WorkerArgs::try_parse_from(["endpoint"]).is_err());
    }

    #[tokio::test]
    async fn serves_requests_in_order_on_one_connection() {
        let (port, _stop) = start(greet).await;

        let responses = exchange(
            port,
            &[
                r#"{"method":"Iotasvc.ServeHttp","params":["world"],"id":0}"#,
                r#"{"method":"Iotasvc.ServeHttp","params":[""],"id":1}"#,
            ],
        )
        .await;

        assert_eq!(responses[0], RpcResponse::ok(0, "hello world"));
        assert_eq!(responses[1], RpcResponse::err(1, "name must not be empty"));
    }

    #[tokio::test]
    async fn unknown_method_and_bad_params_are_errors() {
        let (port, _stop) = start(greet).await;

        let responses = exchange(
            port,
            &[
                r#"{"method":"Other.Method","params":["x"],"id":5}"#,
                r#"{"method":"Iotasvc.ServeHttp","params":["a","b"],"id":6}"#,
            ],
        )
        .await;

        assert_eq!(responses[0].id, 5);
        assert!(responses[0].error.as_deref().unwrap().contains("Other.Method"));
        assert_eq!(responses[1].id, 6);
        assert!(responses[1].result.is_none());
    }

    #[tokio::test]
    async fn stops_accepting_after_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(serve(listener, Arc::new(greet), async {
            let _ = stop_rx.await;
        }));

        stop_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
