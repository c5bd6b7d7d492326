// src/watch/watcher.rs

use std::path::PathBuf;
use std::sync::Arc;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::fs::HALT_MARKER;
use crate::watch::event::created_file_names;

/// Callback invoked with the name of every file created in the watched
/// directory. Runs on the watcher task, so it should only hand work off.
pub type OnCreated = Arc<dyn Fn(&str) + Send + Sync>;

/// Handle for a running signal watcher.
///
/// Owns the underlying `RecommendedWatcher`; dropping the handle stops
/// watching and aborts the event loop.
pub struct WatcherHandle {
    dir: PathBuf,
    _inner: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// True once the event loop has exited (halt marker seen or channel
    /// closed).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("dir", &self.dir)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Watch `dir` (non-recursively) and call `on_created` for each new file.
///
/// The loop ends when the halt marker appears; the owner is expected to
/// drop the handle and start a fresh watcher once the directory has been
/// recreated.
pub fn spawn_signal_watcher(dir: impl Into<PathBuf>, on_created: OnCreated) -> Result<WatcherHandle> {
    let dir = dir.into();

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                // The receiver is gone once the loop has stopped.
                let _ = event_tx.send(event);
            }
            Err(err) => warn!(error = %err, "signal watch error"),
        },
        Config::default(),
    )?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!(dir = ?dir, "signal watcher started");

    let loop_dir = dir.clone();
    let task = tokio::spawn(async move {
        'events: while let Some(event) = event_rx.recv().await {
            debug!(?event, "received notify event");

            for name in created_file_names(&event) {
                if name == HALT_MARKER {
                    info!(dir = ?loop_dir, "halt marker observed; signal watcher stopping");
                    break 'events;
                }
                on_created(&name);
            }
        }
        debug!("signal watcher event loop finished");
    });

    Ok(WatcherHandle {
        dir,
        _inner: watcher,
        task,
    })
}
