// src/job/handle.rs

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::job::{InstanceId, JobDescriptor, JobKey};

/// Request sent to the task that owns a running child, asking it to kill the
/// child. The reply says whether the child is confirmed dead.
#[derive(Debug)]
pub struct KillRequest {
    pub ack: oneshot::Sender<bool>,
}

/// Lifecycle state of a handle. A handle only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Running,
    Terminating,
}

/// What happened when a kill was requested through a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReply {
    /// The owning task killed the child and confirmed it exited.
    Killed,
    /// The kill call returned but the child still looks alive.
    StillAlive,
    /// The owning task is gone: the child already exited on its own.
    AlreadyExited,
}

/// One running instance of a job, as stored in the registry.
///
/// The OS child itself is owned by the instance's wait task; the handle only
/// carries the channel that reaches that task.
#[derive(Debug, Clone)]
pub struct JobHandle {
    instance: InstanceId,
    descriptor: Arc<JobDescriptor>,
    control: mpsc::Sender<KillRequest>,
    launched_at: Instant,
    state: HandleState,
}

impl JobHandle {
    pub fn new(
        instance: InstanceId,
        descriptor: Arc<JobDescriptor>,
        control: mpsc::Sender<KillRequest>,
    ) -> Self {
        Self {
            instance,
            descriptor,
            control,
            launched_at: Instant::now(),
            state: HandleState::Running,
        }
    }

    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    pub fn descriptor(&self) -> &Arc<JobDescriptor> {
        &self.descriptor
    }

    pub fn job_key(&self) -> JobKey {
        self.descriptor.key()
    }

    pub fn launched_at(&self) -> Instant {
        self.launched_at
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn mark_terminating(&mut self) {
        self.state = HandleState::Terminating;
    }

    /// The task that owned the child has returned; kill requests can no
    /// longer reach anything.
    pub fn owner_gone(&self) -> bool {
        self.control.is_closed()
    }

    /// Ask the owning task to kill the child and wait for its answer.
    pub async fn request_kill(&self) -> KillReply {
        let (ack, reply) = oneshot::channel();
        if self.control.send(KillRequest { ack }).await.is_err() {
            return KillReply::AlreadyExited;
        }
        match reply.await {
            Ok(true) => KillReply::Killed,
            Ok(false) => KillReply::StillAlive,
            Err(_) => KillReply::AlreadyExited,
        }
    }
}
