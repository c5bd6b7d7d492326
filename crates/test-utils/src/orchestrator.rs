use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

use jobgate::engine::Engine;
use jobgate::link::{Credentials, Request, Signal, decode, encode, read_frame, serve_connection, write_frame};

const BUFFER: usize = 1 << 20;

/// The Orchestrator side of an in-memory session.
///
/// Frames are exchanged over a `tokio::io::duplex` pair; the engine side runs
/// the real session loop.
pub struct OrchestratorStub {
    reader: ReadHalf<DuplexStream>,
    writer: WriteHalf<DuplexStream>,
    session: JoinHandle<()>,
}

impl OrchestratorStub {
    /// Open a new session against `engine`. Nothing is sent yet.
    pub fn open(engine: &Arc<Engine>) -> Self {
        Self::open_with_limit(engine, BUFFER)
    }

    pub fn open_with_limit(engine: &Arc<Engine>, max_frame_len: usize) -> Self {
        let (client, server) = tokio::io::duplex(BUFFER);
        let (server_reader, server_writer) = tokio::io::split(server);
        let session = tokio::spawn(serve_connection(
            Arc::clone(engine),
            server_reader,
            server_writer,
            max_frame_len,
        ));
        let (reader, writer) = tokio::io::split(client);
        Self {
            reader,
            writer,
            session,
        }
    }

    pub async fn send(&mut self, request: &Request) -> Result<()> {
        let payload = encode(request)?;
        write_frame(&mut self.writer, &payload).await?;
        Ok(())
    }

    /// Write raw bytes, bypassing the framing.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Next signal, failing after 5 seconds.
    pub async fn recv(&mut self) -> Result<Signal> {
        self.recv_within(Duration::from_secs(5))
            .await?
            .ok_or_else(|| anyhow!("no signal within 5s"))
    }

    /// Next signal, or `None` if nothing arrives within `wait`.
    pub async fn recv_within(&mut self, wait: Duration) -> Result<Option<Signal>> {
        match tokio::time::timeout(wait, read_frame(&mut self.reader, BUFFER)).await {
            Err(_) => Ok(None),
            Ok(frame) => {
                let payload = frame?.context("engine closed the session")?;
                Ok(Some(decode(&payload)?))
            }
        }
    }

    /// Send `connect` and return the catalog from the acknowledgement.
    pub async fn connect(&mut self, user: &str) -> Result<Signal> {
        self.send(&Request::Connect {
            credentials: Credentials {
                user: user.to_string(),
                token: Some("secret".to_string()),
            },
        })
        .await?;
        let ack = self.recv().await?;
        match &ack {
            Signal::ConnectAck { accepted: true, .. } => Ok(ack),
            other => bail!("expected an accepted connect_ack, got {other:?}"),
        }
    }

    /// True if no signal arrives within `wait`.
    pub async fn is_silent_for(&mut self, wait: Duration) -> Result<bool> {
        Ok(self.recv_within(wait).await?.is_none())
    }

    /// Whether the engine side of the session has ended.
    pub fn session_finished(&self) -> bool {
        self.session.is_finished()
    }

    /// Close our side and wait for the engine's session loop to end.
    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await?;
        self.session.await?;
        Ok(())
    }
}
