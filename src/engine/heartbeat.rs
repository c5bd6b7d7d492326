// src/engine/heartbeat.rs

//! Liveness contract with the Orchestrator.
//!
//! The loop wakes every `interval`. If nothing has arrived for at least
//! `interval` it pings; if a dead-connection timeout is configured and
//! exceeded, it drops the session and resets the engine instead.

use std::sync::Weak;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditEventType, CHANNEL_CONNECTION};
use crate::engine::Engine;
use crate::link::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Recent contact; nothing to do.
    Idle,
    Ping { idle: Duration },
    Disconnect { idle: Duration },
}

pub fn decide(idle: Duration, interval: Duration, dead_after: Option<Duration>) -> HeartbeatAction {
    if dead_after.is_some_and(|dead| idle >= dead) {
        return HeartbeatAction::Disconnect { idle };
    }
    if idle >= interval {
        return HeartbeatAction::Ping { idle };
    }
    HeartbeatAction::Idle
}

pub(crate) fn spawn_heartbeat(
    engine: Weak<Engine>,
    interval: Duration,
    dead_after: Option<Duration>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(?interval, ?dead_after, "heartbeat loop started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }

            let Some(engine) = engine.upgrade() else {
                break;
            };
            if !engine.link().is_connected() {
                continue;
            }

            match decide(engine.idle(), interval, dead_after) {
                HeartbeatAction::Idle => {}
                HeartbeatAction::Ping { idle } => {
                    let ping = Signal::HeartBeatPing {
                        idle_ms: u64::try_from(idle.as_millis()).unwrap_or(u64::MAX),
                    };
                    if let Err(err) = engine.link().send(&ping).await {
                        warn!(error = %err, "heartbeat ping failed");
                    }
                }
                HeartbeatAction::Disconnect { idle } => engine.drop_dead_connection(idle),
            }
        }
        debug!("heartbeat loop finished");
    })
}

impl Engine {
    /// Stop a session that stayed silent past the dead-connection timeout
    /// and rebuild the engine state.
    pub fn drop_dead_connection(&self, idle: Duration) {
        let Some(session) = self.link.stop_active() else {
            return;
        };
        warn!(session, ?idle, "orchestrator connection considered dead");
        self.record_audit(AuditEvent::new(
            "orchestrator.connection_lost",
            CHANNEL_CONNECTION,
            AuditEventType::Failure,
            json!({
                "session": session,
                "idle_ms": u64::try_from(idle.as_millis()).unwrap_or(u64::MAX),
            }),
        ));

        match self.reset().and_then(|()| self.restart_watcher()) {
            Ok(()) => info!("engine reset after lost connection"),
            Err(err) => self.log_failure("connection_lost_reset", &err),
        }
    }
}
