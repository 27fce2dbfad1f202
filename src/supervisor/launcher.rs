// src/supervisor/launcher.rs

//! Pluggable launch abstraction.
//!
//! The supervisor talks to a `JobLauncher` instead of spawning OS processes
//! itself. This keeps one copy of the registry / restart / termination logic
//! for every job kind, while the kind-specific parts live behind the trait:
//!
//! - [`ProcessLauncher`](super::process::ProcessLauncher) spawns native
//!   executables.
//! - [`ScriptLauncher`](super::script::ScriptLauncher) runs scripts through a
//!   configured interpreter.
//! - Tests provide launchers that never touch the OS.

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::job::{InstanceId, JobDescriptor};
use crate::types::{JobKind, JobOutcome};

/// Boxed, sendable future used by the object-safe traits in this module.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Starts external entities for one job kind.
pub trait JobLauncher: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Start one instance of `descriptor`.
    ///
    /// Returns once the entity is running; never waits for it to finish.
    fn launch<'a>(
        &'a self,
        descriptor: &'a JobDescriptor,
    ) -> BoxFuture<'a, Result<Box<dyn RunningJob>>>;
}

/// A started external entity, exclusively owned by its wait task.
pub trait RunningJob: Send {
    fn instance(&self) -> InstanceId;

    /// Wait for the entity to exit on its own. Must be cancel-safe: the wait
    /// task drops this future whenever a kill request arrives.
    fn wait(&mut self) -> BoxFuture<'_, Result<JobOutcome>>;

    /// Force-kill the entity. `Ok(true)` means it is confirmed gone,
    /// `Ok(false)` means it still looks alive after the kill call returned.
    fn kill(&mut self) -> BoxFuture<'_, Result<bool>>;
}
