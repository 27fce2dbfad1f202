// src/registry.rs

//! Registry of live job instances.
//!
//! The registry is the single source of truth for "what is running now". It
//! is a plain map behind one coarse mutex; every operation is short and never
//! awaits while holding the lock.
//!
//! ## Rules
//! - An instance identity appears at most once; `register` never overwrites.
//! - `remove` is the arbitration point between a natural exit and a forced
//!   termination racing each other: whichever caller gets `Some(handle)` back
//!   owns the follow-up work, the other one gets `None` and backs off.
//! - Removing the last entry wakes every `wait_until_empty` caller.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::debug;

use crate::job::{InstanceId, JobHandle};

#[derive(Debug, Default)]
pub struct JobRegistry {
    entries: Mutex<BTreeMap<InstanceId, JobHandle>>,
    emptied: Notify,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<InstanceId, JobHandle>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a handle. Returns `false` (and drops `handle`) if the identity
    /// is already present.
    pub fn register(&self, instance: InstanceId, handle: JobHandle) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(&instance) {
            debug!(%instance, "refusing to overwrite live registry entry");
            return false;
        }
        entries.insert(instance, handle);
        true
    }

    /// Put back a handle whose termination was abandoned.
    ///
    /// Refused when the identity is present again or the owning task has
    /// already returned. The wait task closes its control channel before it
    /// calls `remove`, so under the lock a live owner cannot be mistaken for
    /// a gone one.
    pub fn restore(&self, instance: InstanceId, handle: JobHandle) -> bool {
        let mut entries = self.lock();
        if handle.owner_gone() || entries.contains_key(&instance) {
            debug!(%instance, "not restoring registry entry");
            return false;
        }
        entries.insert(instance, handle);
        true
    }

    /// Remove and return the handle for `instance`. Absent identities are a
    /// no-op.
    pub fn remove(&self, instance: &InstanceId) -> Option<JobHandle> {
        let (removed, now_empty) = {
            let mut entries = self.lock();
            let removed = entries.remove(instance);
            (removed, entries.is_empty())
        };
        if removed.is_some() && now_empty {
            self.emptied.notify_waiters();
        }
        removed
    }

    /// Ordered copy of the current entries.
    pub fn snapshot(&self) -> Vec<(InstanceId, JobHandle)> {
        self.lock()
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Is any instance of the job with this key currently registered?
    pub fn contains_job(&self, key: &str) -> bool {
        self.lock()
            .values()
            .any(|handle| handle.descriptor().key() == key)
    }

    /// Completes once the registry holds no entries.
    pub async fn wait_until_empty(&self) {
        loop {
            let notified = self.emptied.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a removal racing with the
            // check cannot be missed.
            notified.as_mut().enable();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}
