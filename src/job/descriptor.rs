// src/job/descriptor.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::job::JobKey;
use crate::types::{JobKind, JobOutcome};

/// What to do when a supervised instance exits on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Relaunch after a non-zero / abnormal exit.
    pub on_failure: bool,
    /// Pause before relaunching.
    pub delay: Duration,
    /// Cap on back-to-back relaunches; `None` keeps the job alive forever.
    pub max_consecutive: Option<u32>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            on_failure: true,
            delay: Duration::ZERO,
            max_consecutive: None,
        }
    }
}

impl RestartPolicy {
    pub fn never() -> Self {
        Self {
            on_failure: false,
            ..Self::default()
        }
    }

    /// Decide whether an exit with `outcome` should be followed by a relaunch,
    /// given how many relaunches already happened back to back.
    ///
    /// Shutdown state is checked by the supervisor, not here.
    pub fn should_restart(&self, outcome: JobOutcome, restarts_so_far: u32) -> bool {
        if !self.on_failure || !outcome.is_failure() {
            return false;
        }
        match self.max_consecutive {
            Some(max) => restarts_so_far < max,
            None => true,
        }
    }
}

/// Immutable description of one configured job.
///
/// Built once from the validated config and shared as `Arc<JobDescriptor>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    kind: JobKind,
    path: String,
    args: Vec<String>,
    requires_signature: bool,
    trusted_digest: Option<String>,
    restart: RestartPolicy,
}

impl JobDescriptor {
    pub fn process(path: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            kind: JobKind::Process,
            path: path.into(),
            args,
            requires_signature: false,
            trusted_digest: None,
            restart: RestartPolicy::default(),
        }
    }

    /// Scripts run to completion and are picked up again by the next
    /// dispatch tick, so they default to no immediate relaunch.
    pub fn script(path: impl Into<String>, requires_signature: bool) -> Self {
        Self {
            kind: JobKind::Script,
            path: path.into(),
            args: Vec::new(),
            requires_signature,
            trusted_digest: None,
            restart: RestartPolicy::never(),
        }
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_trusted_digest(mut self, digest: impl Into<String>) -> Self {
        self.trusted_digest = Some(digest.into());
        self
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Stable identity of this job: its configured path, trimmed.
    pub fn key(&self) -> JobKey {
        self.path.trim().to_string()
    }

    /// The path to launch, or `None` for a disabled entry (empty or blank).
    pub fn resolved_path(&self) -> Option<PathBuf> {
        let trimmed = self.path.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }

    /// Path handed to the OS. A relative path with a directory part is made
    /// absolute, since the job starts inside that directory.
    pub fn program_path(&self) -> Option<PathBuf> {
        let path = self.resolved_path()?;
        if path.is_relative() && self.working_dir().is_some() {
            return Some(std::path::absolute(&path).unwrap_or(path));
        }
        Some(path)
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn requires_signature(&self) -> bool {
        self.requires_signature
    }

    pub fn trusted_digest(&self) -> Option<&str> {
        self.trusted_digest.as_deref()
    }

    pub fn restart(&self) -> &RestartPolicy {
        &self.restart
    }

    /// Directory the job should start in: the executable's own directory.
    pub fn working_dir(&self) -> Option<PathBuf> {
        let path = self.resolved_path()?;
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => Some(parent.to_path_buf()),
            _ => None,
        }
    }

    /// Display helper used in log lines.
    pub fn display_path(&self) -> &Path {
        Path::new(self.path.trim())
    }
}
