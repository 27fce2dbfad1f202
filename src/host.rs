// src/host.rs

//! The long-running host: one supervisor and one dispatch loop per job kind,
//! a fault channel from the loops back to the host, and the shutdown
//! coordinator as the last step before returning an exit code.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ConfigFile;
use crate::dispatch::{DEFAULT_DISPATCH_INTERVAL, DispatchCore, DispatchExit, DispatchLoop};
use crate::fs::{FileSystem, RealFileSystem};
use crate::job::JobDescriptor;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::supervisor::{DigestGate, ProcessLauncher, ScriptLauncher, Supervisor, SupervisorOptions};
use crate::types::JobKind;

#[derive(Debug, Clone)]
pub struct HostOptions {
    pub service_name: String,
    pub dispatch_interval: Duration,
    pub grace_period: Duration,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            service_name: "jobkeeper".to_string(),
            dispatch_interval: DEFAULT_DISPATCH_INTERVAL,
            grace_period: Duration::from_secs(15),
        }
    }
}

/// An unrecoverable failure inside a dispatch task.
#[derive(Debug, Clone)]
pub struct HostFault {
    pub kind: JobKind,
    pub message: String,
}

/// How [`Host::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostExit {
    /// Cancelled, or every dispatch loop ran out of jobs.
    Clean(ShutdownReport),
    /// A dispatch task failed; everything was terminated anyway.
    Faulted(ShutdownReport),
}

impl HostExit {
    /// Process exit code: 0 for a clean stop, 1 after a fault.
    pub fn code(&self) -> i32 {
        match self {
            HostExit::Clean(_) => 0,
            HostExit::Faulted(_) => 1,
        }
    }

    pub fn report(&self) -> &ShutdownReport {
        match self {
            HostExit::Clean(report) | HostExit::Faulted(report) => report,
        }
    }
}

enum LoopReport {
    Stopped(JobKind, DispatchExit),
    Faulted(HostFault),
}

/// Account for one finished loop. Returns whether it faulted.
fn record_report(report: LoopReport, active: &mut usize) -> bool {
    *active = active.saturating_sub(1);
    match report {
        LoopReport::Stopped(kind, exit) => {
            info!(%kind, ?exit, "dispatch loop stopped");
            false
        }
        LoopReport::Faulted(fault) => {
            error!(kind = %fault.kind, error = %fault.message, "dispatch task failed; shutting down");
            true
        }
    }
}

struct DispatchUnit {
    supervisor: Arc<Supervisor>,
    jobs: Vec<Arc<JobDescriptor>>,
}

pub struct Host {
    options: HostOptions,
    units: Vec<DispatchUnit>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<_> = self.units.iter().map(|u| u.supervisor.kind()).collect();
        f.debug_struct("Host")
            .field("options", &self.options)
            .field("kinds", &kinds)
            .finish()
    }
}

impl Host {
    pub fn new(options: HostOptions) -> Self {
        Self {
            options,
            units: Vec::new(),
        }
    }

    /// Add a supervisor and the job list its dispatch loop walks.
    pub fn with_jobs(mut self, supervisor: Arc<Supervisor>, jobs: Vec<Arc<JobDescriptor>>) -> Self {
        self.units.push(DispatchUnit { supervisor, jobs });
        self
    }

    /// Production wiring: a process supervisor and a script supervisor with a
    /// digest gate, both reading from the real file system.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let options = HostOptions {
            service_name: cfg.service_name().to_string(),
            dispatch_interval: cfg.dispatch_interval(),
            grace_period: cfg.grace_period(),
        };
        let supervisor_options = SupervisorOptions {
            kill_attempts: cfg.kill_attempts(),
            ..SupervisorOptions::default()
        };

        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let (interpreter, interpreter_args) = cfg.interpreter();

        let processes = Supervisor::new(Arc::new(ProcessLauncher::new())).with_options(supervisor_options);
        let scripts = Supervisor::new(Arc::new(ScriptLauncher::new(
            interpreter,
            interpreter_args,
            Arc::clone(&fs),
        )))
        .with_gate(Arc::new(DigestGate::new(fs)))
        .with_options(supervisor_options);

        Host::new(options)
            .with_jobs(Arc::new(processes), cfg.process_jobs())
            .with_jobs(Arc::new(scripts), cfg.script_jobs())
    }

    pub fn supervisors(&self) -> Vec<Arc<Supervisor>> {
        self.units.iter().map(|u| Arc::clone(&u.supervisor)).collect()
    }

    /// Run until `cancel` fires, a dispatch task faults, or every dispatch
    /// loop stops for lack of jobs. Always terminates all tracked jobs before
    /// returning.
    pub async fn run(self, cancel: CancellationToken) -> HostExit {
        info!(service = %self.options.service_name, "host starting");

        let supervisors = self.supervisors();
        let dispatch_cancel = cancel.child_token();
        let (report_tx, mut reports) = mpsc::channel::<LoopReport>(8);

        let mut active = 0usize;
        for unit in self.units {
            let kind = unit.supervisor.kind();
            let dispatch = DispatchLoop::new(
                DispatchCore::new(unit.jobs),
                unit.supervisor,
                self.options.dispatch_interval,
                dispatch_cancel.clone(),
            );
            let task = tokio::spawn(dispatch.run());

            let tx = report_tx.clone();
            tokio::spawn(async move {
                let report = match task.await {
                    Ok(exit) => LoopReport::Stopped(kind, exit),
                    Err(err) => LoopReport::Faulted(HostFault {
                        kind,
                        message: err.to_string(),
                    }),
                };
                let _ = tx.send(report).await;
            });
            active += 1;
        }
        drop(report_tx);

        let mut faulted = false;
        while active > 0 && !faulted {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("cancellation requested");
                    break;
                }
                report = reports.recv() => match report {
                    Some(report) => faulted = record_report(report, &mut active),
                    None => break,
                },
            }
        }
        if active == 0 && !faulted {
            info!("every dispatch loop has stopped");
        }

        // A loop may be in the middle of a launch. Let it finish and register
        // the instance before the sweep takes its snapshot.
        dispatch_cancel.cancel();
        let draining = async {
            while active > 0 {
                match reports.recv().await {
                    Some(report) => faulted |= record_report(report, &mut active),
                    None => break,
                }
            }
        };
        if timeout(self.options.grace_period, draining).await.is_err() {
            warn!(grace = ?self.options.grace_period, "dispatch loops did not stop in time");
        }

        let report = ShutdownCoordinator::new(self.options.grace_period)
            .shutdown(&supervisors)
            .await;

        info!(
            service = %self.options.service_name,
            terminated = report.terminated,
            remaining = report.remaining,
            "host stopped"
        );

        if faulted {
            HostExit::Faulted(report)
        } else {
            HostExit::Clean(report)
        }
    }
}
