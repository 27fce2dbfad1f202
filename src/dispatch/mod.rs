// src/dispatch/mod.rs

//! Fixed-interval dispatch of the configured job list.
//!
//! On every tick the loop asks its supervisor to make sure each configured
//! job is running. The pure state machine lives in [`core`]; the async shell
//! that owns the timer and talks to the supervisor is in [`runtime`].

use std::sync::Arc;

use crate::job::JobDescriptor;

pub mod core;
pub mod runtime;

pub use self::core::DispatchCore;
pub use self::runtime::DispatchLoop;

/// Interval used when none is configured. The first tick is immediate.
pub const DEFAULT_DISPATCH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Running,
    Stopped,
}

/// Why a dispatch loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    /// The job list was empty at the start of a tick.
    NothingToSupervise,
    /// The process-wide cancellation token fired.
    Cancelled,
}

/// Command produced by the pure core, to be executed by the async shell.
#[derive(Debug, Clone)]
pub enum DispatchCommand {
    EnsureRunning(Arc<JobDescriptor>),
}

/// Decision returned by the core for one tick.
#[derive(Debug, Clone)]
pub struct DispatchStep {
    pub commands: Vec<DispatchCommand>,
    /// Whether the loop should keep ticking.
    pub keep_running: bool,
    /// Entries skipped this tick because their path did not resolve.
    pub skipped: usize,
}
