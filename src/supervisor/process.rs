// src/supervisor/process.rs

//! Native process launching on top of `tokio::process`.

use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::errors::{JobkeeperError, Result};
use crate::job::{InstanceId, JobDescriptor};
use crate::supervisor::launcher::{BoxFuture, JobLauncher, RunningJob};
use crate::types::{JobKind, JobOutcome};

/// Launches configured executables directly (no shell), one OS process per
/// instance, identified by its process id.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl JobLauncher for ProcessLauncher {
    fn kind(&self) -> JobKind {
        JobKind::Process
    }

    fn launch<'a>(
        &'a self,
        descriptor: &'a JobDescriptor,
    ) -> BoxFuture<'a, Result<Box<dyn RunningJob>>> {
        Box::pin(async move {
            let path = descriptor.program_path().ok_or_else(|| JobkeeperError::LaunchError {
                job: descriptor.key(),
                reason: "path is empty".to_string(),
            })?;

            let mut cmd = Command::new(&path);
            cmd.args(descriptor.args());
            if let Some(dir) = descriptor.working_dir() {
                cmd.current_dir(dir);
            }

            let child = spawn_captured(cmd, descriptor)?;
            let pid = child.id().ok_or_else(|| JobkeeperError::LaunchError {
                job: descriptor.key(),
                reason: "process exited before its id could be read".to_string(),
            })?;

            Ok(Box::new(ChildJob::new(child, InstanceId::Pid(pid))) as Box<dyn RunningJob>)
        })
    }
}

/// Spawn `cmd` with stdout/stderr captured (not inherited) and drained into
/// the log, stdin closed, and the child killed if its owner is dropped.
///
/// On unix the child leads a new process group, so a kill reaches whatever
/// it started in turn.
pub(crate) fn spawn_captured(mut cmd: Command, descriptor: &JobDescriptor) -> Result<Child> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning {} job '{}'", descriptor.kind(), descriptor.key()))?;

    let key = descriptor.key();
    if let Some(stdout) = child.stdout.take() {
        drain_lines(stdout, key.clone(), "stdout");
    }
    if let Some(stderr) = child.stderr.take() {
        drain_lines(stderr, key, "stderr");
    }

    Ok(child)
}

/// Always consume child output so pipe buffers never fill; log at debug.
fn drain_lines<R>(reader: R, job: String, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(job = %job, stream, "{}", line);
        }
    });
}

/// A spawned OS child.
#[derive(Debug)]
pub struct ChildJob {
    child: Child,
    instance: InstanceId,
}

impl ChildJob {
    pub fn new(child: Child, instance: InstanceId) -> Self {
        Self { child, instance }
    }
}

impl RunningJob for ChildJob {
    fn instance(&self) -> InstanceId {
        self.instance.clone()
    }

    fn wait(&mut self) -> BoxFuture<'_, Result<JobOutcome>> {
        Box::pin(async move {
            let status = self.child.wait().await?;
            Ok(JobOutcome::from_exit_status(status))
        })
    }

    fn kill(&mut self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            #[cfg(unix)]
            if let Some(pid) = self.child.id() {
                kill_process_group(pid);
            }
            // `kill` signals the child itself and reaps it.
            self.child.kill().await?;
            Ok(self.child.try_wait()?.is_some())
        })
    }
}

/// SIGKILL the process group led by `pid`. Failure is not fatal: the caller
/// still kills the child directly.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    // Negative pid addresses the group.
    match kill(Pid::from_raw(-raw), Signal::SIGKILL) {
        Ok(()) => debug!(pid, "sent SIGKILL to process group"),
        Err(err) => debug!(pid, error = %err, "process group kill failed; killing the child alone"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn launches_and_reports_exit_code() {
        let descriptor = JobDescriptor::process("/bin/sh", vec!["-c".into(), "exit 3".into()]);
        let mut job = ProcessLauncher::new().launch(&descriptor).await.unwrap();
        assert!(matches!(job.instance(), InstanceId::Pid(_)));
        assert_eq!(job.wait().await.unwrap(), JobOutcome::Failed(3));
    }

    #[tokio::test]
    async fn kill_confirms_the_child_is_gone() {
        let descriptor = JobDescriptor::process("/bin/sh", vec!["-c".into(), "sleep 30".into()]);
        let mut job = ProcessLauncher::new().launch(&descriptor).await.unwrap();
        assert!(job.kill().await.unwrap());
    }

    #[tokio::test]
    async fn child_leads_its_own_process_group() {
        let descriptor = JobDescriptor::process("/bin/sh", vec!["-c".into(), "exec sleep 30".into()]);
        let mut job = ProcessLauncher::new().launch(&descriptor).await.unwrap();
        let InstanceId::Pid(pid) = job.instance() else {
            panic!("process instances are keyed by pid");
        };

        let pid = nix::unistd::Pid::from_raw(pid as i32);
        assert_eq!(nix::unistd::getpgid(Some(pid)).unwrap(), pid);
        assert!(job.kill().await.unwrap());
    }

    #[tokio::test]
    async fn missing_executable_is_a_launch_error() {
        let descriptor = JobDescriptor::process("/definitely/not/here", vec![]);
        assert!(ProcessLauncher::new().launch(&descriptor).await.is_err());
    }
}
