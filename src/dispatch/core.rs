// src/dispatch/core.rs

//! Pure dispatch state machine.
//!
//! `DispatchCore` knows the static job list and the RUNNING / STOPPED state.
//! It has no timer, no channels and performs no IO, so every transition is
//! unit tested directly.

use std::sync::Arc;

use tracing::debug;

use crate::dispatch::{DispatchCommand, DispatchState, DispatchStep};
use crate::job::JobDescriptor;

#[derive(Debug)]
pub struct DispatchCore {
    jobs: Vec<Arc<JobDescriptor>>,
    state: DispatchState,
    ticks: u64,
}

impl DispatchCore {
    pub fn new(jobs: Vec<Arc<JobDescriptor>>) -> Self {
        Self {
            jobs,
            state: DispatchState::Running,
            ticks: 0,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Number of ticks evaluated while RUNNING.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Evaluate one tick.
    ///
    /// - STOPPED is terminal: nothing is dispatched.
    /// - An empty job list moves RUNNING → STOPPED.
    /// - Otherwise every entry with a resolvable path becomes an
    ///   `EnsureRunning` command, in configured order; blank paths are
    ///   skipped.
    pub fn tick(&mut self) -> DispatchStep {
        if self.state == DispatchState::Stopped {
            return DispatchStep {
                commands: Vec::new(),
                keep_running: false,
                skipped: 0,
            };
        }

        if self.jobs.is_empty() {
            self.state = DispatchState::Stopped;
            return DispatchStep {
                commands: Vec::new(),
                keep_running: false,
                skipped: 0,
            };
        }

        self.ticks += 1;

        let mut commands = Vec::with_capacity(self.jobs.len());
        let mut skipped = 0;
        for job in &self.jobs {
            if job.resolved_path().is_none() {
                debug!(kind = %job.kind(), "skipping job entry with empty path");
                skipped += 1;
                continue;
            }
            commands.push(DispatchCommand::EnsureRunning(Arc::clone(job)));
        }

        DispatchStep {
            commands,
            keep_running: true,
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(step: &DispatchStep) -> Vec<String> {
        step.commands
            .iter()
            .map(|DispatchCommand::EnsureRunning(d)| d.key())
            .collect()
    }

    #[test]
    fn empty_list_stops_on_first_tick_and_stays_stopped() {
        let mut core = DispatchCore::new(Vec::new());
        let step = core.tick();
        assert!(!step.keep_running);
        assert_eq!(core.state(), DispatchState::Stopped);

        let again = core.tick();
        assert!(!again.keep_running);
        assert!(again.commands.is_empty());
        assert_eq!(core.ticks(), 0);
    }

    #[test]
    fn dispatches_resolvable_jobs_in_order() {
        let mut core = DispatchCore::new(vec![
            Arc::new(JobDescriptor::process("B", vec!["--x".into()])),
            Arc::new(JobDescriptor::process("", vec![])),
            Arc::new(JobDescriptor::process("A", vec![])),
        ]);

        let step = core.tick();
        assert!(step.keep_running);
        assert_eq!(paths(&step), vec!["B".to_string(), "A".to_string()]);
        assert_eq!(step.skipped, 1);
        assert_eq!(core.state(), DispatchState::Running);
    }

    #[test]
    fn only_blank_entries_keep_running_without_commands() {
        let mut core = DispatchCore::new(vec![Arc::new(JobDescriptor::process("  ", vec![]))]);
        for _ in 0..3 {
            let step = core.tick();
            assert!(step.keep_running);
            assert!(step.commands.is_empty());
        }
        assert_eq!(core.state(), DispatchState::Running);
        assert_eq!(core.ticks(), 3);
    }
}
