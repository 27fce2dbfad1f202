// src/job/mod.rs

//! Job data model shared by the registry, supervisors and dispatch loops.
//!
//! - [`descriptor`]: the immutable, configured description of a job.
//! - [`handle`]: one live instance of a job as tracked by the registry.

use std::fmt;

pub mod descriptor;
pub mod handle;

pub use descriptor::{JobDescriptor, RestartPolicy};
pub use handle::{HandleState, JobHandle, KillRequest};

/// Stable identity of a configured job: its configured path.
pub type JobKey = String;

/// Identity of one running execution of a job.
///
/// Processes are keyed by OS process id. Scripts are single-instance per
/// path, so the job key doubles as the instance identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceId {
    Pid(u32),
    Job(JobKey),
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceId::Pid(pid) => write!(f, "pid:{pid}"),
            InstanceId::Job(key) => write!(f, "job:{key}"),
        }
    }
}
