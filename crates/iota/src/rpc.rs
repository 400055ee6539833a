//! RPC proxy - one request/response round trip to a worker.
//!
//! A fresh TCP connection per call, no pooling. Failures are surfaced as-is and
//! never retried.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::JsonLinesCodec;
use crate::bridge::protocol::{RpcRequest, RpcResponse};

/// Default bound on a whole call (connect + round trip).
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Workers only listen on loopback; `--port` is their whole interface.
pub const WORKER_HOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to worker at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("worker i/o error: {0}")]
    Io(#[source] io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("worker did not answer within {0:?}")]
    TimedOut(Duration),
    #[error("worker closed the connection without replying")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The worker function itself returned an error.
    #[error("{0}")]
    Application(String),
}

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub connect_timeout: Duration,
    /// `None` waits forever.
    pub call_timeout: Option<Duration>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
        }
    }
}

/// Cheap to clone; each in-flight invoke task holds its own copy.
#[derive(Debug, Clone)]
pub struct RpcProxy {
    config: Arc<RpcConfig>,
    next_id: Arc<AtomicU64>,
}

impl RpcProxy {
    pub fn new(config: RpcConfig) -> Self {
        Self {
            config: Arc::new(config),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn call(&self, port: u16, argument: &str) -> Result<String, CallError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let round_trip = self.round_trip(port, id, argument);

        match self.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, round_trip)
                .await
                .map_err(|_| TransportError::TimedOut(limit))?,
            None => round_trip.await,
        }
    }

    async fn round_trip(&self, port: u16, id: u64, argument: &str) -> Result<String, CallError> {
        let addr = SocketAddr::from((WORKER_HOST, port));

        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::TimedOut(self.config.connect_timeout))?
            .map_err(|source| TransportError::Connect { addr, source })?;
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        let mut writer = FramedWrite::new(write_half, JsonLinesCodec::<RpcRequest>::new());
        let mut reader = FramedRead::new(read_half, JsonLinesCodec::<RpcResponse>::new());

        tracing::trace!(%addr, id, "Sending call");
        writer
            .send(RpcRequest::serve_http(id, argument))
            .await
            .map_err(TransportError::Io)?;

        let response = match reader.next().await {
            Some(Ok(response)) => response,
            Some(Err(e)) => return Err(read_error(e).into()),
            None => return Err(TransportError::Closed.into()),
        };

        if response.id != id {
            return Err(TransportError::Protocol(format!(
                "response id {} does not match request id {id}",
                response.id
            ))
            .into());
        }

        match response.into_outcome() {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(CallError::Application(message)),
            None => Err(TransportError::Protocol(
                "response carries neither result nor error".to_string(),
            )
            .into()),
        }
    }
}

impl Default for RpcProxy {
    fn default() -> Self {
        Self::new(RpcConfig::default())
    }
}

fn read_error(e: io::Error) -> TransportError {
    if e.kind() == io::ErrorKind::InvalidData {
        TransportError::Protocol(e.to_string())
    } else {
        TransportError::Io(e)
    }
}
