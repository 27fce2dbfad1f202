// src/lib.rs

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod fs;
pub mod host;
pub mod job;
pub mod logging;
pub mod registry;
pub mod shutdown;
pub mod signals;
pub mod supervisor;
pub mod types;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::host::Host;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - supervisors and dispatch loops (via `Host`)
/// - OS signal handling
///
/// Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(0);
    }

    info!(
        service = cfg.service_name(),
        processes = cfg.processes().len(),
        scripts = cfg.scripts().len(),
        "configuration loaded"
    );

    let cancel = CancellationToken::new();
    let _signals = signals::spawn_signal_listener(cancel.clone());

    let exit = Host::from_config(&cfg).run(cancel).await;
    Ok(exit.code())
}

/// Simple dry-run output: print host settings and the resolved job lists.
fn print_dry_run(cfg: &ConfigFile) {
    println!("jobkeeper dry-run");
    println!("  host.service_name = {:?}", cfg.service_name());
    println!("  host.dispatch_interval = {:?}", cfg.dispatch_interval());
    println!("  host.grace_period = {:?}", cfg.grace_period());
    println!("  host.kill_attempts = {}", cfg.kill_attempts());
    let (interpreter, interpreter_args) = cfg.interpreter();
    println!("  scripts.interpreter = {interpreter} {interpreter_args:?}");
    println!();

    let processes = cfg.process_jobs();
    println!("processes ({}):", processes.len());
    for job in &processes {
        if job.resolved_path().is_none() {
            println!("  - <disabled: empty path>");
            continue;
        }
        println!("  - {}", job.display_path().display());
        if !job.args().is_empty() {
            println!("      args: {:?}", job.args());
        }
        let restart = job.restart();
        if restart.on_failure {
            println!("      restart_on_failure: true");
            if !restart.delay.is_zero() {
                println!("      restart_delay: {:?}", restart.delay);
            }
            if let Some(max) = restart.max_consecutive {
                println!("      max_restarts: {max}");
            }
        } else {
            println!("      restart_on_failure: false");
        }
    }
    println!();

    let scripts = cfg.script_jobs();
    println!("scripts ({}):", scripts.len());
    for job in &scripts {
        if job.resolved_path().is_none() {
            println!("  - <disabled: empty path>");
            continue;
        }
        println!("  - {}", job.display_path().display());
        if job.requires_signature() {
            println!("      requires_signed_signature: true");
        }
        if let Some(digest) = job.trusted_digest() {
            println!("      blake3: {digest}");
        }
    }

    debug!("dry-run complete (no execution)");
}
