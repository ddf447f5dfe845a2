//! TCP listener with single-slot admission control.
//!
//! The accept loop is single-threaded and sequential, which serializes
//! slot acquisition: no two connections can race the check-then-acquire.
//! Granted connections get `<OK_>` and a dedicated session task; everyone
//! else gets `<BSY>` and an immediate close.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use assistant_protocol::Greeting;

use crate::config::ServerConfig;
use crate::engine::InferenceEngine;
use crate::session::Session;
use crate::slot::ExclusiveSlot;

/// Pause after a failed accept before trying again. A single bad accept
/// must not kill the listener.
const ACCEPT_RETRY: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid bind address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error("failed to bind: {0}")]
    Bind(#[source] std::io::Error),
}

#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    slot: ExclusiveSlot,
}

impl Listener {
    pub async fn bind(config: &ServerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
        let inner = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = inner.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(address = %local_addr, "server bound");

        Ok(Self {
            inner,
            slot: ExclusiveSlot::new(),
        })
    }

    /// Bind, retrying forever on transient failures (port still held by a
    /// dying process, interface not up yet). A malformed address is
    /// reported immediately instead of retried.
    pub async fn bind_with_retry(config: &ServerConfig) -> Result<Self, ListenerError> {
        loop {
            match Self::bind(config).await {
                Ok(listener) => return Ok(listener),
                Err(ListenerError::Addr(e)) => return Err(ListenerError::Addr(e)),
                Err(e) => {
                    tracing::error!(error = %e, retry_in = ?config.bind_retry, "bind failed");
                    tokio::time::sleep(config.bind_retry).await;
                }
            }
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept loop with admission control.
    pub async fn run(self, engine: Arc<dyn InferenceEngine>) {
        loop {
            let (mut stream, peer) = match self.inner.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_RETRY).await;
                    continue;
                }
            };
            tracing::info!(%peer, "client connected");

            let Some(permit) = self.slot.try_acquire() else {
                tracing::info!(%peer, "slot held, rejecting connection");
                if let Err(e) = stream.write_all(Greeting::Busy.as_bytes()).await {
                    tracing::debug!(%peer, error = %e, "failed to send busy signal");
                }
                // Stream drops here, closing the rejected connection.
                continue;
            };

            if let Err(e) = stream.write_all(Greeting::Granted.as_bytes()).await {
                // The session never started; dropping the permit frees the
                // slot without an engine reset.
                tracing::warn!(%peer, error = %e, "failed to greet client");
                continue;
            }

            let session = Session::new(peer, Arc::clone(&engine));
            tokio::spawn(session.run(stream, permit));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_on_ephemeral_port_reports_local_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        };

        let listener = Listener::bind(&config).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn malformed_host_is_an_addr_error() {
        let config = ServerConfig {
            host: "not-an-ip".to_string(),
            ..Default::default()
        };

        let err = Listener::bind(&config).await.unwrap_err();
        assert!(matches!(err, ListenerError::Addr(_)));
    }
}
