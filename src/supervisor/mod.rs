// src/supervisor/mod.rs

//! Supervision of external jobs.
//!
//! One [`Supervisor`] exists per job kind. It keeps at most one live instance
//! per configured job, relaunches instances that fail, and force-terminates
//! instances on request. Everything kind-specific sits behind
//! [`JobLauncher`] (how to start an instance) and [`PreExecutionGate`]
//! (whether a script may run at all).
//!
//! - [`launcher`]: the `JobLauncher` / `RunningJob` capability traits.
//! - [`process`]: native executables via `tokio::process`.
//! - [`script`]: scripts via a configured interpreter.
//! - [`gate`]: signature (digest) verification for scripts.
//! - `instance`: the per-instance wait / relaunch task.
//! - `claims`: per-job launch claims.
//!
//! ## Termination protocol
//! ```text
//! terminate(id) ── registry.remove(id) ──┬─ None ──► NotFound (no-op)
//!                                        └─ Some ──► KillRequest ──► wait task kills child
//!                                                     └─ still alive? retry (kill_attempts),
//!                                                        then restore the handle and report Failed
//!
//! wait task: child exits ── registry.remove(id) ──┬─ Some ──► maybe relaunch
//!                                                 └─ None ──► terminator owns it; stop
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod claims;
pub mod gate;
mod instance;
pub mod launcher;
pub mod process;
pub mod script;

pub use gate::{DigestGate, GateDecision, PreExecutionGate};
pub use launcher::{BoxFuture, JobLauncher, RunningJob};
pub use process::ProcessLauncher;
pub use script::ScriptLauncher;

use crate::job::{InstanceId, JobDescriptor, JobKey, handle::KillReply};
use crate::registry::JobRegistry;
use crate::types::JobKind;
use claims::JobClaims;

/// Result of [`Supervisor::ensure_running`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// A new instance was launched, registered and is being watched.
    Started(InstanceId),
    /// An instance of this job is already live (or being launched).
    AlreadyRunning,
    /// The pre-execution gate refused this job.
    Rejected,
    /// The external entity could not be started; retried on a later tick.
    LaunchFailed,
    /// Shutdown has begun; nothing new is launched.
    ShuttingDown,
}

/// Result of [`Supervisor::terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// The instance was killed and its exit confirmed.
    Terminated,
    /// The instance had already exited by the time the kill reached it.
    AlreadyExited,
    /// No such instance was registered.
    NotFound,
    /// Every kill attempt left the entity alive.
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    /// How many kill requests to send before giving up on an instance.
    pub kill_attempts: u32,
    /// Pause between kill attempts.
    pub kill_retry_delay: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            kill_attempts: 5,
            kill_retry_delay: Duration::from_millis(200),
        }
    }
}

/// Point-in-time copy of a supervisor's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    pub launches: u64,
    pub restarts: u64,
    pub rejections: u64,
    pub launch_failures: u64,
    pub terminations: u64,
    pub termination_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    launches: AtomicU64,
    restarts: AtomicU64,
    rejections: AtomicU64,
    launch_failures: AtomicU64,
    terminations: AtomicU64,
    termination_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Supervisor {
    kind: JobKind,
    registry: Arc<JobRegistry>,
    launcher: Arc<dyn JobLauncher>,
    gate: Option<Arc<dyn PreExecutionGate>>,
    claims: JobClaims,
    rejected: Mutex<HashSet<JobKey>>,
    shutdown: CancellationToken,
    options: SupervisorOptions,
    counters: Counters,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("kind", &self.kind)
            .field("registry", &self.registry)
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(launcher: Arc<dyn JobLauncher>) -> Self {
        Self {
            kind: launcher.kind(),
            registry: Arc::new(JobRegistry::new()),
            launcher,
            gate: None,
            claims: JobClaims::default(),
            rejected: Mutex::new(HashSet::new()),
            shutdown: CancellationToken::new(),
            options: SupervisorOptions::default(),
            counters: Counters::default(),
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn PreExecutionGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_options(mut self, options: SupervisorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Stop launching and relaunching. Does not kill anything by itself.
    pub fn begin_shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(kind = %self.kind, "supervisor entering shutdown");
        }
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn stats(&self) -> SupervisorStats {
        let c = &self.counters;
        SupervisorStats {
            launches: c.launches.load(Ordering::Relaxed),
            restarts: c.restarts.load(Ordering::Relaxed),
            rejections: c.rejections.load(Ordering::Relaxed),
            launch_failures: c.launch_failures.load(Ordering::Relaxed),
            terminations: c.terminations.load(Ordering::Relaxed),
            termination_failures: c.termination_failures.load(Ordering::Relaxed),
        }
    }

    fn is_rejected(&self, key: &str) -> bool {
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Make sure one instance of `descriptor` is running.
    ///
    /// Returns as soon as the instance is registered and its wait task is
    /// spawned; never waits for the job to finish.
    pub async fn ensure_running(self: &Arc<Self>, descriptor: Arc<JobDescriptor>) -> EnsureOutcome {
        let key = descriptor.key();

        if self.is_shutting_down() {
            debug!(kind = %self.kind, job = %key, "shutting down; not launching");
            return EnsureOutcome::ShuttingDown;
        }
        if self.is_rejected(&key) {
            debug!(kind = %self.kind, job = %key, "job was rejected earlier; skipping");
            return EnsureOutcome::Rejected;
        }

        let Some(claim) = self.claims.try_claim(&key) else {
            // Claimed but unregistered means a launch is still in flight.
            debug!(
                kind = %self.kind,
                job = %key,
                registered = self.registry.contains_job(&key),
                "job is already running"
            );
            return EnsureOutcome::AlreadyRunning;
        };

        if descriptor.requires_signature() {
            let decision = match &self.gate {
                Some(gate) => gate.verify(&descriptor).await,
                None => GateDecision::Rejected("no verification gate configured".to_string()),
            };
            if let GateDecision::Rejected(reason) = decision {
                self.rejected
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key.clone());
                Counters::bump(&self.counters.rejections);
                warn!(
                    event = "job-rejected",
                    kind = %self.kind,
                    job = %key,
                    reason = %reason,
                    "signature verification failed; correct the job and restart the service"
                );
                return EnsureOutcome::Rejected;
            }
        }

        match self.launch_instance(&descriptor).await {
            Some(live) => {
                let instance = live.instance.clone();
                let me = Arc::clone(self);
                tokio::spawn(async move {
                    me.supervise(descriptor, live, claim).await;
                });
                EnsureOutcome::Started(instance)
            }
            None => EnsureOutcome::LaunchFailed,
        }
    }

    /// Force-terminate one instance.
    ///
    /// Removing the handle from the registry decides ownership: if it is not
    /// there, either it never existed or it already exited on its own, and
    /// this is a reported no-op.
    pub async fn terminate(&self, instance: &InstanceId) -> TerminateOutcome {
        let Some(mut handle) = self.registry.remove(instance) else {
            warn!(kind = %self.kind, %instance, "cannot terminate: instance not found");
            return TerminateOutcome::NotFound;
        };
        handle.mark_terminating();
        let job = handle.job_key();

        for attempt in 1..=self.options.kill_attempts.max(1) {
            match handle.request_kill().await {
                KillReply::Killed => {
                    Counters::bump(&self.counters.terminations);
                    info!(
                        event = "job-terminate",
                        kind = %self.kind,
                        job = %job,
                        %instance,
                        uptime = ?handle.launched_at().elapsed(),
                        "instance terminated"
                    );
                    return TerminateOutcome::Terminated;
                }
                KillReply::AlreadyExited => {
                    info!(event = "job-terminate", kind = %self.kind, job = %job, %instance, "instance had already exited");
                    return TerminateOutcome::AlreadyExited;
                }
                KillReply::StillAlive => {
                    warn!(
                        event = "job-terminate-failure",
                        kind = %self.kind,
                        job = %job,
                        %instance,
                        attempt,
                        "instance still running after kill; retrying"
                    );
                    tokio::time::sleep(self.options.kill_retry_delay).await;
                }
            }
        }

        Counters::bump(&self.counters.termination_failures);
        error!(
            event = "job-terminate-failure",
            kind = %self.kind,
            job = %job,
            %instance,
            attempts = self.options.kill_attempts,
            "giving up on terminating instance"
        );
        // Still alive, so it stays visible to later sweeps and to the
        // shutdown report's remaining count.
        if !self.registry.restore(instance.clone(), handle) {
            debug!(kind = %self.kind, job = %job, %instance, "instance went away while giving up");
        }
        TerminateOutcome::Failed
    }

    /// Terminate every instance registered at the time of the call.
    ///
    /// Returns how many entries this sweep handled (terminated or found
    /// already exited).
    pub async fn terminate_all(&self) -> usize {
        let snapshot = self.registry.snapshot();
        debug!(kind = %self.kind, count = snapshot.len(), "terminating all instances");

        let mut handled = 0;
        for (instance, _) in snapshot {
            match self.terminate(&instance).await {
                TerminateOutcome::Terminated | TerminateOutcome::AlreadyExited => handled += 1,
                TerminateOutcome::NotFound | TerminateOutcome::Failed => {}
            }
        }
        handled
    }
}
