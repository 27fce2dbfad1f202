use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use jobkeeper::errors::{JobkeeperError, Result};
use jobkeeper::job::{InstanceId, JobDescriptor, JobKey};
use jobkeeper::supervisor::{BoxFuture, GateDecision, JobLauncher, PreExecutionGate, RunningJob};
use jobkeeper::types::{JobKind, JobOutcome};

#[derive(Default)]
struct FakeState {
    launched: Vec<(JobKey, InstanceId)>,
    exits: HashMap<InstanceId, mpsc::UnboundedSender<JobOutcome>>,
    failing: HashSet<JobKey>,
    panicking: HashSet<JobKey>,
    refuse_kills: u32,
    kill_calls: u32,
    killed: Vec<InstanceId>,
    launch_delay: Option<Duration>,
}

/// A launcher that starts nothing.
///
/// - every launch is recorded and gets a fresh fake pid (or the job key for
///   script-kind launchers),
/// - an instance runs until the test calls [`FakeLauncher::exit`] or the
///   supervisor kills it,
/// - launches of chosen jobs can fail or panic,
/// - the next N kill calls can be refused (the instance stays "alive").
#[derive(Clone)]
pub struct FakeLauncher {
    kind: JobKind,
    state: Arc<Mutex<FakeState>>,
    next_pid: Arc<AtomicU32>,
}

impl FakeLauncher {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(FakeState::default())),
            next_pid: Arc::new(AtomicU32::new(1000)),
        }
    }

    pub fn processes() -> Self {
        Self::new(JobKind::Process)
    }

    pub fn scripts() -> Self {
        Self::new(JobKind::Script)
    }

    pub fn fail_launches_of(&self, key: &str) {
        self.state.lock().unwrap().failing.insert(key.to_string());
    }

    pub fn panic_on_launch_of(&self, key: &str) {
        self.state.lock().unwrap().panicking.insert(key.to_string());
    }

    pub fn refuse_next_kills(&self, count: u32) {
        self.state.lock().unwrap().refuse_kills = count;
    }

    /// Make each launch take `delay` before it returns.
    pub fn launch_delay(&self, delay: Duration) {
        self.state.lock().unwrap().launch_delay = Some(delay);
    }

    /// End a running instance with `outcome`. Returns false if it is not
    /// running (never launched, already exited or killed).
    pub fn exit(&self, instance: &InstanceId, outcome: JobOutcome) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.exits.remove(instance) {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn launched(&self) -> Vec<(JobKey, InstanceId)> {
        self.state.lock().unwrap().launched.clone()
    }

    pub fn launch_count(&self, key: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .launched
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }

    pub fn last_instance_of(&self, key: &str) -> Option<InstanceId> {
        self.state
            .lock()
            .unwrap()
            .launched
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, id)| id.clone())
    }

    pub fn kill_calls(&self) -> u32 {
        self.state.lock().unwrap().kill_calls
    }

    pub fn killed(&self) -> Vec<InstanceId> {
        self.state.lock().unwrap().killed.clone()
    }
}

impl JobLauncher for FakeLauncher {
    fn kind(&self) -> JobKind {
        self.kind
    }

    fn launch<'a>(
        &'a self,
        descriptor: &'a JobDescriptor,
    ) -> BoxFuture<'a, Result<Box<dyn RunningJob>>> {
        Box::pin(async move {
            let key = descriptor.key();
            let delay = self.state.lock().unwrap().launch_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.state.lock().unwrap();
            if state.panicking.contains(&key) {
                drop(state);
                panic!("fake launcher told to panic on '{key}'");
            }
            if state.failing.contains(&key) {
                return Err(JobkeeperError::LaunchError {
                    job: key,
                    reason: "fake launch failure".to_string(),
                });
            }

            let instance = match self.kind {
                JobKind::Process => InstanceId::Pid(self.next_pid.fetch_add(1, Ordering::SeqCst)),
                JobKind::Script => InstanceId::Job(key.clone()),
            };
            let (tx, rx) = mpsc::unbounded_channel();
            state.exits.insert(instance.clone(), tx);
            state.launched.push((key, instance.clone()));

            Ok(Box::new(FakeJob {
                instance,
                exit_rx: rx,
                state: Arc::clone(&self.state),
            }) as Box<dyn RunningJob>)
        })
    }
}

struct FakeJob {
    instance: InstanceId,
    exit_rx: mpsc::UnboundedReceiver<JobOutcome>,
    state: Arc<Mutex<FakeState>>,
}

impl RunningJob for FakeJob {
    fn instance(&self) -> InstanceId {
        self.instance.clone()
    }

    fn wait(&mut self) -> BoxFuture<'_, Result<JobOutcome>> {
        Box::pin(async move {
            match self.exit_rx.recv().await {
                Some(outcome) => Ok(outcome),
                // Killed: the sender is gone and no exit will ever arrive.
                None => std::future::pending().await,
            }
        })
    }

    fn kill(&mut self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.kill_calls += 1;
            if state.refuse_kills > 0 {
                state.refuse_kills -= 1;
                return Ok(false);
            }
            state.exits.remove(&self.instance);
            state.killed.push(self.instance.clone());
            Ok(true)
        })
    }
}

/// A gate with a fixed verdict that counts how often it was asked.
#[derive(Clone)]
pub struct RecordingGate {
    decision: GateDecision,
    calls: Arc<AtomicUsize>,
}

impl RecordingGate {
    pub fn accepting() -> Self {
        Self {
            decision: GateDecision::Accepted,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn rejecting(reason: &str) -> Self {
        Self {
            decision: GateDecision::Rejected(reason.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PreExecutionGate for RecordingGate {
    fn verify<'a>(&'a self, _descriptor: &'a JobDescriptor) -> BoxFuture<'a, GateDecision> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.decision.clone()
        })
    }
}
