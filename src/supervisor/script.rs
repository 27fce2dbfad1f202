// src/supervisor/script.rs

//! Script launching through a configured interpreter.
//!
//! Scripts are single-instance per path, so the script path doubles as the
//! instance identity. Every run is told it was started by the supervisor:
//! `JOBKEEPER_AUTOMATED=1` and `JOBKEEPER_CURRENT_DATETIME_UTC` (RFC 3339)
//! are set in its environment.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tokio::process::Command;

use crate::errors::{JobkeeperError, Result};
use crate::fs::FileSystem;
use crate::job::{InstanceId, JobDescriptor};
use crate::supervisor::launcher::{BoxFuture, JobLauncher, RunningJob};
use crate::supervisor::process::{ChildJob, spawn_captured};
use crate::types::JobKind;

pub const AUTOMATED_ENV: &str = "JOBKEEPER_AUTOMATED";
pub const CURRENT_DATETIME_ENV: &str = "JOBKEEPER_CURRENT_DATETIME_UTC";

/// Interpreter used when the config does not name one.
pub fn default_interpreter() -> (String, Vec<String>) {
    if cfg!(windows) {
        (
            "pwsh".to_string(),
            vec!["-NoProfile".into(), "-NonInteractive".into(), "-File".into()],
        )
    } else {
        ("sh".to_string(), Vec::new())
    }
}

#[derive(Debug, Clone)]
pub struct ScriptLauncher {
    interpreter: String,
    interpreter_args: Vec<String>,
    fs: Arc<dyn FileSystem>,
}

impl ScriptLauncher {
    pub fn new(interpreter: impl Into<String>, interpreter_args: Vec<String>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            interpreter: interpreter.into(),
            interpreter_args,
            fs,
        }
    }

    /// `<interpreter> <interpreter_args..> <script> <script args..>`
    fn command_for(&self, descriptor: &JobDescriptor) -> Result<Command> {
        let path = descriptor.program_path().ok_or_else(|| JobkeeperError::LaunchError {
            job: descriptor.key(),
            reason: "path is empty".to_string(),
        })?;
        if !self.fs.is_file(&path) {
            return Err(JobkeeperError::LaunchError {
                job: descriptor.key(),
                reason: "script file does not exist".to_string(),
            });
        }

        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.interpreter_args)
            .arg(&path)
            .args(descriptor.args())
            .env(AUTOMATED_ENV, "1")
            .env(
                CURRENT_DATETIME_ENV,
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            );
        if let Some(dir) = descriptor.working_dir() {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }
}

impl JobLauncher for ScriptLauncher {
    fn kind(&self) -> JobKind {
        JobKind::Script
    }

    fn launch<'a>(
        &'a self,
        descriptor: &'a JobDescriptor,
    ) -> BoxFuture<'a, Result<Box<dyn RunningJob>>> {
        Box::pin(async move {
            let cmd = self.command_for(descriptor)?;
            let child = spawn_captured(cmd, descriptor)?;
            let job = ChildJob::new(child, InstanceId::Job(descriptor.key()));
            Ok(Box::new(job) as Box<dyn RunningJob>)
        })
    }
}
