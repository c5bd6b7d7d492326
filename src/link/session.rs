// src/link/session.rs

//! One Orchestrator session and the engine's handle to the active one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::errors::{EngineError, Result};
use crate::jobs::lock;
use crate::link::frame::{FrameError, read_frame, write_frame};
use crate::link::message::{Request, Signal, decode, encode};

/// Boxed write half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Sending side of one session.
///
/// Every outbound frame goes through `writer`'s lock, so signals from
/// concurrent workers are never interleaved.
#[derive(Clone)]
pub struct SessionHandle {
    id: u64,
    writer: Arc<tokio::sync::Mutex<BoxedWriter>>,
    stop: Arc<Notify>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}

impl SessionHandle {
    pub fn new(id: u64, writer: BoxedWriter) -> Self {
        Self {
            id,
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Ask the session's receive loop to end.
    pub fn request_stop(&self) {
        self.stop.notify_one();
    }

    pub async fn send(&self, signal: &Signal) -> Result<()> {
        let payload = encode(signal)?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &payload)
            .await
            .map_err(|err| match err {
                FrameError::Io(io) => EngineError::IoError(io),
                other => EngineError::Protocol(other.to_string()),
            })?;
        debug!(session = self.id, signal = signal.kind(), "signal sent");
        Ok(())
    }
}

/// The engine's view of the Orchestrator: at most one active session.
#[derive(Debug, Default)]
pub struct OrchestratorLink {
    active: Mutex<Option<SessionHandle>>,
    next_id: AtomicU64,
}

impl OrchestratorLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_session_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Make `session` the active one, returning the session it replaced.
    pub fn attach(&self, session: SessionHandle) -> Option<SessionHandle> {
        lock(&self.active).replace(session)
    }

    /// Forget session `id` if it is still the active one.
    pub fn detach(&self, id: u64) -> bool {
        let mut active = lock(&self.active);
        if active.as_ref().is_some_and(|s| s.id == id) {
            *active = None;
            return true;
        }
        false
    }

    /// Stop and forget the active session, if any.
    pub fn stop_active(&self) -> Option<u64> {
        let session = lock(&self.active).take()?;
        session.request_stop();
        Some(session.id)
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.active).is_some()
    }

    pub fn active_id(&self) -> Option<u64> {
        lock(&self.active).as_ref().map(SessionHandle::id)
    }

    /// Send through the active session.
    pub async fn send(&self, signal: &Signal) -> Result<()> {
        let session = lock(&self.active).clone();
        match session {
            Some(session) => session.send(signal).await,
            None => Err(EngineError::NotConnected),
        }
    }
}

/// Run the receive loop for one accepted connection.
///
/// The loop is strictly sequential. `connect`, `halt_all_jobs`,
/// `heart_beat_pong` and `vm_shutdown` run inline; every other request is
/// handed to a detached worker. Requests before `connect` are dropped.
pub async fn serve_connection<R, W>(engine: Arc<Engine>, mut reader: R, writer: W, max_frame_len: usize)
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let session = SessionHandle::new(engine.link().next_session_id(), Box::new(writer));
    let id = session.id();
    let stop = Arc::clone(&session.stop);
    let mut shutdown = engine.shutdown_signal();
    let mut connected = false;

    info!(session = id, "orchestrator session opened");

    if *shutdown.borrow_and_update() {
        info!(session = id, "engine is shutting down; refusing session");
        return;
    }

    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut reader, max_frame_len) => frame,
            _ = stop.notified() => {
                info!(session = id, "session replaced or stopped");
                break;
            }
            _ = shutdown.changed() => {
                info!(session = id, "engine shutting down; closing session");
                break;
            }
        };

        let payload = match frame {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                info!(session = id, "orchestrator closed the connection");
                break;
            }
            Err(err) if err.is_recoverable() => {
                warn!(session = id, error = %err, "protocol error; frame dropped");
                continue;
            }
            Err(err) => {
                warn!(session = id, error = %err, "session read failed");
                break;
            }
        };

        engine.touch();

        let request: Request = match decode(&payload) {
            Ok(request) => request,
            Err(err) => {
                warn!(session = id, error = %err, "protocol error; undecodable request dropped");
                continue;
            }
        };

        debug!(session = id, request = request.kind(), "request received");

        match request {
            Request::Connect { credentials } => {
                match engine.connect(credentials, session.clone()).await {
                    Ok(()) => connected = true,
                    Err(err) => engine.log_failure("connect", &err),
                }
            }
            other if !connected => {
                warn!(
                    session = id,
                    request = other.kind(),
                    "protocol error; request before connect dropped"
                );
            }
            Request::HaltAllJobs => {
                if let Err(err) = engine.halt_all_jobs() {
                    engine.log_failure("halt_all_jobs", &err);
                }
            }
            Request::HeartBeatPong => engine.heartbeat_pong(),
            Request::VmShutdown => {
                engine.vm_shutdown().await;
                break;
            }
            other => engine.spawn_request(other),
        }
    }

    if engine.link().detach(id) {
        debug!(session = id, "active session detached");
    }
    info!(session = id, "orchestrator session closed");
}
