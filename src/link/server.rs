// src/link/server.rs

//! Accept loop for Orchestrator connections.

use std::sync::Arc;

use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::errors::Result;
use crate::link::session::serve_connection;
use crate::types::Transport;

/// A bound listener on one of the supported transports.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Listener {
    pub async fn bind(transport: Transport, address: &str) -> Result<Self> {
        match transport {
            Transport::Tcp => {
                let listener = TcpListener::bind(address).await?;
                info!(address = %listener.local_addr()?, "listening for orchestrator (tcp)");
                Ok(Listener::Tcp(listener))
            }
            #[cfg(unix)]
            Transport::Unix => {
                // A stale socket file from a previous run would make bind fail.
                match std::fs::remove_file(address) {
                    Ok(()) => info!(path = %address, "removed stale socket file"),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
                let listener = UnixListener::bind(address)?;
                info!(path = %address, "listening for orchestrator (unix)");
                Ok(Listener::Unix(listener))
            }
            #[cfg(not(unix))]
            Transport::Unix => Err(crate::errors::EngineError::ConfigError(
                "unix sockets are not supported on this platform".to_string(),
            )),
        }
    }

    /// Local TCP address, when listening on TCP.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        match self {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Listener::Unix(_) => None,
        }
    }
}

/// Accept connections until the engine shuts down.
///
/// Each connection gets its own session task; a `connect` on a newer
/// session replaces the older one inside the engine.
pub async fn serve(engine: Arc<Engine>, listener: Listener, max_frame_len: usize) -> Result<()> {
    let mut shutdown = engine.shutdown_signal();
    if *shutdown.borrow_and_update() {
        return Ok(());
    }

    loop {
        tokio::select! {
            accepted = accept(&engine, &listener, max_frame_len) => {
                if let Err(err) = accepted {
                    warn!(error = %err, "accept failed");
                }
            }
            _ = shutdown.changed() => {
                info!("engine shut down; accept loop finished");
                return Ok(());
            }
        }
    }
}

async fn accept(engine: &Arc<Engine>, listener: &Listener, max_frame_len: usize) -> Result<()> {
    let engine = Arc::clone(engine);
    match listener {
        Listener::Tcp(listener) => {
            let (stream, peer) = listener.accept().await?;
            info!(%peer, "orchestrator connection accepted");
            let (reader, writer) = stream.into_split();
            tokio::spawn(serve_connection(engine, reader, writer, max_frame_len));
        }
        #[cfg(unix)]
        Listener::Unix(listener) => {
            let (stream, _) = listener.accept().await?;
            info!("orchestrator connection accepted (unix)");
            let (reader, writer) = stream.into_split();
            tokio::spawn(serve_connection(engine, reader, writer, max_frame_len));
        }
    }
    Ok(())
}
