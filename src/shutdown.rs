// src/shutdown.rs

//! Orderly termination of every tracked job.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::{info, warn};

use crate::supervisor::Supervisor;

/// What a shutdown achieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Instances terminated (or found already exited) by the sweeps.
    pub terminated: usize,
    /// Registry entries still present when the coordinator gave up.
    pub remaining: usize,
    /// Whether the grace period ran out.
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Stop every supervisor and drain its registry.
    ///
    /// 1. Flip all supervisors to shutting-down, so no relaunch can start.
    /// 2. `terminate_all` on each.
    /// 3. Wait until every registry is empty, bounded by the grace period.
    ///
    /// Running out of grace is logged, not returned as an error.
    pub async fn shutdown(&self, supervisors: &[Arc<Supervisor>]) -> ShutdownReport {
        let deadline = Instant::now() + self.grace;

        for supervisor in supervisors {
            supervisor.begin_shutdown();
        }

        // Counted outside the sweep so a timed-out sweep still reports what
        // it managed before the deadline.
        let mut terminated = 0;
        let sweep = async {
            for supervisor in supervisors {
                terminated += supervisor.terminate_all().await;
            }
            for supervisor in supervisors {
                supervisor.registry().wait_until_empty().await;
            }
        };
        let drained = timeout_at(deadline, sweep).await.is_ok();

        if drained {
            info!(terminated, "all jobs terminated");
            return ShutdownReport {
                terminated,
                remaining: 0,
                timed_out: false,
            };
        }

        let remaining: usize = supervisors.iter().map(|s| s.registry().count()).sum();
        warn!(
            remaining,
            terminated,
            grace = ?self.grace,
            "grace period elapsed with jobs still registered"
        );
        ShutdownReport {
            terminated,
            remaining,
            timed_out: true,
        }
    }
}
