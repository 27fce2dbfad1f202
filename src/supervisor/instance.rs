// src/supervisor/instance.rs

//! Per-instance wait task.
//!
//! Each launched instance is owned by exactly one Tokio task, which:
//! - waits for the entity to exit on its own, or
//! - serves kill requests arriving through the instance's `JobHandle`,
//!
//! and, after a natural failure, relaunches the job according to its
//! [`RestartPolicy`](crate::job::RestartPolicy). Relaunching is a loop inside
//! this task, never a recursive call.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::job::{InstanceId, JobDescriptor, JobHandle, KillRequest};
use crate::supervisor::claims::ClaimGuard;
use crate::supervisor::launcher::RunningJob;
use crate::supervisor::{Counters, Supervisor};
use crate::types::JobOutcome;

/// A launched and registered instance, together with the receiving end of its
/// control channel.
pub(crate) struct LiveInstance {
    pub instance: InstanceId,
    job: Box<dyn RunningJob>,
    control: mpsc::Receiver<KillRequest>,
}

/// How watching one instance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstanceExit {
    /// Exited on its own and this task removed it from the registry.
    Natural(JobOutcome),
    /// Killed on request; the requester removed it from the registry.
    Killed,
    /// Exited on its own, but a terminator had already removed it.
    Superseded,
}

impl Supervisor {
    /// Launch one instance and register it. Launch failures are logged and
    /// reported as `None`.
    pub(crate) async fn launch_instance(&self, descriptor: &Arc<JobDescriptor>) -> Option<LiveInstance> {
        let key = descriptor.key();

        let mut job = match self.launcher.launch(descriptor).await {
            Ok(job) => job,
            Err(err) => {
                Counters::bump(&self.counters.launch_failures);
                error!(
                    kind = %self.kind,
                    job = %key,
                    error = %err,
                    "failed to launch job"
                );
                return None;
            }
        };

        let instance = job.instance();
        let (control_tx, control_rx) = mpsc::channel(4);
        let handle = JobHandle::new(instance.clone(), Arc::clone(descriptor), control_tx);

        if !self.registry.register(instance.clone(), handle) {
            Counters::bump(&self.counters.launch_failures);
            error!(kind = %self.kind, job = %key, %instance, "instance identity already registered; killing duplicate");
            if let Err(err) = job.kill().await {
                warn!(kind = %self.kind, job = %key, %instance, error = %err, "failed to kill duplicate instance");
            }
            return None;
        }

        Counters::bump(&self.counters.launches);
        info!(
            event = "job-launch",
            kind = %self.kind,
            job = %key,
            %instance,
            args = ?descriptor.args(),
            "job launched"
        );

        Some(LiveInstance {
            instance,
            job,
            control: control_rx,
        })
    }

    /// Watch `live` until it is gone, relaunching per the restart policy.
    ///
    /// `_claim` keeps the job claimed for as long as this task runs.
    pub(crate) async fn supervise(
        self: Arc<Self>,
        descriptor: Arc<JobDescriptor>,
        mut live: LiveInstance,
        _claim: ClaimGuard,
    ) {
        let key = descriptor.key();
        let policy = *descriptor.restart();
        let mut restarts: u32 = 0;

        loop {
            let outcome = match self.watch_instance(&mut live).await {
                InstanceExit::Natural(outcome) => outcome,
                InstanceExit::Killed | InstanceExit::Superseded => return,
            };

            if self.is_shutting_down() {
                debug!(kind = %self.kind, job = %key, "shutting down; not relaunching");
                return;
            }
            if !policy.should_restart(outcome, restarts) {
                if outcome.is_failure() {
                    warn!(
                        kind = %self.kind,
                        job = %key,
                        status = %outcome,
                        restarts,
                        "not relaunching failed job; next dispatch tick will pick it up"
                    );
                }
                return;
            }

            restarts += 1;
            Counters::bump(&self.counters.restarts);
            info!(
                event = "job-restart",
                kind = %self.kind,
                job = %key,
                status = %outcome,
                attempt = restarts,
                "relaunching failed job"
            );

            if !policy.delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(policy.delay) => {}
                    _ = self.shutdown.cancelled() => return,
                }
            }

            live = match self.launch_instance(&descriptor).await {
                Some(next) => next,
                None => return,
            };
        }
    }

    async fn watch_instance(&self, live: &mut LiveInstance) -> InstanceExit {
        let instance = live.instance.clone();

        // Registered after a shutdown sweep may already have taken its
        // snapshot: terminate ourselves unless a terminator got here first.
        if self.is_shutting_down() {
            if let Some(mut handle) = self.registry.remove(&instance) {
                handle.mark_terminating();
                match live.job.kill().await {
                    Ok(true) => {
                        Counters::bump(&self.counters.terminations);
                        info!(event = "job-terminate", kind = %self.kind, job = %handle.job_key(), %instance, "instance terminated during shutdown");
                    }
                    Ok(false) | Err(_) => {
                        Counters::bump(&self.counters.termination_failures);
                        warn!(event = "job-terminate-failure", kind = %self.kind, job = %handle.job_key(), %instance, "could not confirm termination during shutdown");
                    }
                }
                return InstanceExit::Killed;
            }
        }

        loop {
            tokio::select! {
                waited = live.job.wait() => {
                    let outcome = match waited {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            warn!(kind = %self.kind, %instance, error = %err, "error waiting for job; treating as failure");
                            JobOutcome::Failed(-1)
                        }
                    };
                    info!(event = "job-exit", kind = %self.kind, %instance, status = %outcome, "job exited");

                    // Closed before `remove` so an abandoned terminator cannot
                    // restore a handle nobody serves any more.
                    live.control.close();
                    return match self.registry.remove(&instance) {
                        Some(_) => InstanceExit::Natural(outcome),
                        None => {
                            debug!(kind = %self.kind, %instance, "exit raced with a termination request");
                            InstanceExit::Superseded
                        }
                    };
                }
                Some(request) = live.control.recv() => {
                    let dead = match live.job.kill().await {
                        Ok(dead) => dead,
                        Err(err) => {
                            warn!(kind = %self.kind, %instance, error = %err, "kill call failed");
                            false
                        }
                    };
                    let _ = request.ack.send(dead);
                    if dead {
                        return InstanceExit::Killed;
                    }
                }
            }
        }
    }
}
