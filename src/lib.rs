// src/lib.rs

pub mod audit;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod jobs;
pub mod link;
pub mod logging;
pub mod tables;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_or_default};
use crate::engine::{Collaborators, Engine, EngineOptions};
use crate::fs::{FileSystem, RealFileSystem, WorkArea};
use crate::link::{Listener, serve};

/// Load the config, start the engine and serve Orchestrator connections
/// until `vm_shutdown` or Ctrl-C.
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_or_default(PathBuf::from(&args.config))?;
    args.link.apply(&mut cfg.link);

    if args.check {
        print_check(&cfg);
        return Ok(());
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let work_area = WorkArea::from_config(fs, &cfg.storage);
    let collaborators = Collaborators::from_config(&cfg, &work_area);
    let engine = Engine::start(work_area, EngineOptions::from_config(&cfg), collaborators)?;

    let listener = Listener::bind(cfg.link.transport, &cfg.link.address).await?;

    let interrupted = Arc::clone(&engine);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received; shutting down");
                interrupted.shutdown().await;
            }
            Err(err) => warn!(error = %err, "cannot install Ctrl-C handler"),
        }
    });

    serve(Arc::clone(&engine), listener, cfg.link.max_frame_len).await?;
    engine.shutdown().await;
    Ok(())
}

/// `--check` output: the effective configuration.
fn print_check(cfg: &ConfigFile) {
    println!("jobgate configuration ok");
    println!("  link.transport = {}", cfg.link.transport);
    println!("  link.address = {}", cfg.link.address);
    println!("  link.max_frame_len = {}", cfg.link.max_frame_len);
    println!("  storage.signals = {:?}", cfg.storage.signals_path());
    println!("  storage.data = {:?}", cfg.storage.data_path());
    println!("  storage.jobs_signal = {:?}", cfg.storage.jobs_signal_path());
    println!(
        "  heartbeat.interval = {:?}",
        cfg.timings.heartbeat_interval
    );
    match cfg.timings.dead_connection_timeout {
        Some(timeout) => println!("  heartbeat.dead_connection_timeout = {timeout:?}"),
        None => println!("  heartbeat.dead_connection_timeout = disabled"),
    }
    println!(
        "  shutdown_drain_timeout = {:?}",
        cfg.timings.shutdown_drain_timeout
    );
    match &cfg.tables.directory {
        Some(dir) => println!("  tables.directory = {dir:?}"),
        None => println!("  tables.directory = none"),
    }
    println!(
        "  executor = {}",
        if cfg.executor.enabled {
            format!("process (command key '{}')", cfg.executor.command_key)
        } else {
            "disabled".to_string()
        }
    );
}
