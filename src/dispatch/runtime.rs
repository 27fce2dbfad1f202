// src/dispatch/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::supervisor::{EnsureOutcome, Supervisor};

use super::core::DispatchCore;
use super::{DispatchCommand, DispatchExit};

/// Drives a `DispatchCore` on a fixed interval and hands its commands to one
/// `Supervisor`.
///
/// This is a pure IO shell: the timer and cancellation live here, every
/// decision about what to dispatch lives in the core.
pub struct DispatchLoop {
    core: DispatchCore,
    supervisor: Arc<Supervisor>,
    interval: Duration,
    cancel: CancellationToken,
}

impl fmt::Debug for DispatchLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchLoop")
            .field("core", &self.core)
            .field("kind", &self.supervisor.kind())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl DispatchLoop {
    pub fn new(
        core: DispatchCore,
        supervisor: Arc<Supervisor>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            core,
            supervisor,
            interval,
            cancel,
        }
    }

    /// Main loop.
    ///
    /// - The first tick fires immediately, then every `interval`.
    /// - Each tick is evaluated by the core; its commands are executed here.
    /// - Returns when the core stops or the cancellation token fires.
    pub async fn run(mut self) -> DispatchExit {
        let kind = self.supervisor.kind();
        info!(%kind, interval = ?self.interval, "dispatch loop started");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(%kind, "dispatch loop cancelled");
                    return DispatchExit::Cancelled;
                }
                _ = ticker.tick() => {}
            }

            let step = self.core.tick();
            if !step.keep_running {
                info!(
                    event = "registry-empty-shutdown",
                    %kind,
                    "no jobs configured; nothing to supervise"
                );
                return DispatchExit::NothingToSupervise;
            }

            debug!(
                event = "job-dispatch-tick",
                %kind,
                tick = self.core.ticks(),
                jobs = step.commands.len(),
                skipped = step.skipped,
                "dispatch tick"
            );

            for command in step.commands {
                if self.cancel.is_cancelled() {
                    break;
                }
                self.execute_command(command).await;
            }
        }
    }

    async fn execute_command(&self, command: DispatchCommand) {
        match command {
            DispatchCommand::EnsureRunning(descriptor) => {
                let key = descriptor.key();
                let outcome = self.supervisor.ensure_running(descriptor).await;
                if let EnsureOutcome::Started(instance) = &outcome {
                    debug!(kind = %self.supervisor.kind(), job = %key, %instance, "started by dispatch");
                }
            }
        }
    }
}
