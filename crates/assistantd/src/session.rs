//! SessionHandler - drives one granted connection until disconnect.
//!
//! A session pairs a connection with the held slot permit. All exit paths
//! funnel through the same teardown: close the connection, reset the
//! engine, release the slot - in that order, exactly once. Errors never
//! propagate past the session boundary.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tracing::Instrument;
use uuid::Uuid;

use assistant_protocol::{RESPONSE_TERMINATOR, RequestCodec};

use crate::engine::{EngineError, InferenceEngine};
use crate::slot::SlotPermit;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("request framing error: {0}")]
    Read(#[source] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("response write error: {0}")]
    Write(#[source] std::io::Error),
}

pub struct Session {
    id: Uuid,
    peer: SocketAddr,
    engine: Arc<dyn InferenceEngine>,
}

impl Session {
    pub fn new(peer: SocketAddr, engine: Arc<dyn InferenceEngine>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            engine,
        }
    }

    pub async fn run(self, stream: TcpStream, permit: SlotPermit) {
        let (read_half, write_half) = stream.into_split();
        self.run_split(read_half, write_half, permit).await;
    }

    async fn run_split<R, W>(self, read_half: R, write_half: W, permit: SlotPermit)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let span = tracing::info_span!("session", id = %self.id, peer = %self.peer);
        self.serve_then_teardown(read_half, write_half, permit)
            .instrument(span)
            .await;
    }

    async fn serve_then_teardown<R, W>(self, read_half: R, mut write_half: W, permit: SlotPermit)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!("session started");
        let mut requests = FramedRead::new(read_half, RequestCodec::new());

        match self.serve_requests(&mut requests, &mut write_half).await {
            Ok(()) => tracing::info!("client disconnected"),
            Err(e) => tracing::warn!(error = %e, "session ended with error"),
        }

        // Teardown: close, reset, release - in this order, exactly once.
        drop(requests);
        if let Err(e) = write_half.shutdown().await {
            tracing::debug!(error = %e, "connection shutdown failed");
        }
        drop(write_half);
        tracing::info!("connection closed");

        match self.engine.reset().await {
            Ok(()) => tracing::info!("engine reset"),
            Err(e) => tracing::warn!(error = %e, "engine reset failed"),
        }

        permit.release();
    }

    /// Request/response rounds until the peer disconnects or a round fails.
    async fn serve_requests<R, W>(
        &self,
        requests: &mut FramedRead<R, RequestCodec>,
        write_half: &mut W,
    ) -> Result<(), SessionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        while let Some(next) = requests.next().await {
            let request = next.map_err(SessionError::Read)?;
            tracing::info!(chars = request.len(), "request received");
            tracing::debug!(request = %request, "request text");

            let alive = self.stream_response(&request, write_half).await?;
            if !alive {
                // Peer stopped reading mid-stream; no terminator is owed.
                return Ok(());
            }
            tracing::info!("response sent");
        }
        Ok(())
    }

    /// Stream one response. Returns whether the connection was still alive
    /// after the full chunk sequence was drained.
    async fn stream_response<W>(&self, request: &str, write_half: &mut W) -> Result<bool, SessionError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut chunks = self.engine.generate(request).await?;
        let mut alive = true;

        // The engine must finish generating even if nobody is listening, so
        // a dead connection stops writes but not draining.
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            if !alive {
                continue;
            }
            if let Err(e) = write_half.write_all(chunk.as_bytes()).await {
                tracing::warn!(error = %e, "client stopped reading mid-response");
                alive = false;
            }
        }

        if alive {
            write_half
                .write_all(RESPONSE_TERMINATOR)
                .await
                .map_err(SessionError::Write)?;
        }
        Ok(alive)
    }
}
