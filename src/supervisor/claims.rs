// src/supervisor/claims.rs

//! Per-job launch claims.
//!
//! A process instance is keyed by pid, which only exists after the launch.
//! To keep "at most one instance per job" under concurrent `ensure_running`
//! calls, a job key is claimed before launching and stays claimed for the
//! whole life of its supervision task (including relaunches).

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::job::JobKey;

#[derive(Debug, Default)]
pub(crate) struct JobClaims {
    held: Arc<Mutex<HashSet<JobKey>>>,
}

impl JobClaims {
    /// Claim `key`, or `None` if it is already claimed.
    pub fn try_claim(&self, key: &str) -> Option<ClaimGuard> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(key.to_string()) {
            return None;
        }
        Some(ClaimGuard {
            key: key.to_string(),
            held: Arc::clone(&self.held),
        })
    }
}

/// Releases its claim when dropped.
#[derive(Debug)]
pub(crate) struct ClaimGuard {
    key: JobKey,
    held: Arc<Mutex<HashSet<JobKey>>>,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_exclusive_until_dropped() {
        let claims = JobClaims::default();
        let first = claims.try_claim("a").expect("first claim succeeds");
        assert!(claims.try_claim("a").is_none());
        assert!(claims.try_claim("b").is_some());

        drop(first);
        assert!(claims.try_claim("a").is_some());
    }
}
