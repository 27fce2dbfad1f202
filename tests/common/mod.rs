#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use jobkeeper::job::JobDescriptor;
use jobkeeper::supervisor::{Supervisor, SupervisorOptions};
use jobkeeper_test_utils::fake_launcher::FakeLauncher;

pub use jobkeeper_test_utils::init_tracing;

/// Poll `cond` until it holds or three seconds pass.
pub async fn eventually<F: FnMut() -> bool>(mut cond: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Give spawned tasks a moment to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn fast_options() -> SupervisorOptions {
    SupervisorOptions {
        kill_attempts: 5,
        kill_retry_delay: Duration::from_millis(5),
    }
}

pub fn supervisor(launcher: &FakeLauncher) -> Arc<Supervisor> {
    Arc::new(Supervisor::new(Arc::new(launcher.clone())).with_options(fast_options()))
}

pub fn process(path: &str) -> Arc<JobDescriptor> {
    Arc::new(JobDescriptor::process(path, vec![]))
}
