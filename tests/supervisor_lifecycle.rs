// tests/supervisor_lifecycle.rs

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, init_tracing, process, settle, supervisor};

use jobkeeper::job::{HandleState, InstanceId, JobDescriptor, RestartPolicy};
use jobkeeper::shutdown::ShutdownCoordinator;
use jobkeeper::supervisor::{EnsureOutcome, Supervisor, SupervisorOptions, TerminateOutcome};
use jobkeeper::types::JobOutcome;
use jobkeeper_test_utils::capture::EventCapture;
use jobkeeper_test_utils::fake_launcher::{FakeLauncher, RecordingGate};

fn started(outcome: EnsureOutcome) -> InstanceId {
    match outcome {
        EnsureOutcome::Started(id) => id,
        other => panic!("expected Started, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_ensure_running_registers_one_handle() {
    init_tracing();
    let fake = FakeLauncher::processes();
    fake.launch_delay(Duration::from_millis(30));
    let sup = supervisor(&fake);
    let job = process("/bin/worker");

    let (a, b) = tokio::join!(
        sup.ensure_running(Arc::clone(&job)),
        sup.ensure_running(Arc::clone(&job)),
    );

    let outcomes = [a, b];
    let started_count = outcomes
        .iter()
        .filter(|o| matches!(o, EnsureOutcome::Started(_)))
        .count();
    assert_eq!(started_count, 1, "outcomes: {outcomes:?}");
    assert!(outcomes.contains(&EnsureOutcome::AlreadyRunning));
    assert_eq!(sup.registry().count(), 1);
    assert_eq!(fake.launch_count("/bin/worker"), 1);

    // Still running: later ticks are no-ops too.
    assert_eq!(sup.ensure_running(job).await, EnsureOutcome::AlreadyRunning);
    assert_eq!(fake.launch_count("/bin/worker"), 1);
}

#[tokio::test]
async fn terminate_of_absent_instance_is_a_noop() {
    init_tracing();
    let fake = FakeLauncher::processes();
    let sup = supervisor(&fake);

    let outcome = sup.terminate(&InstanceId::Pid(424242)).await;
    assert_eq!(outcome, TerminateOutcome::NotFound);
    assert_eq!(fake.kill_calls(), 0);
    assert_eq!(sup.stats().terminations, 0);
}

#[tokio::test]
async fn failed_exit_relaunches_exactly_once_per_exit() {
    init_tracing();
    let fake = FakeLauncher::processes();
    let sup = supervisor(&fake);

    let first = started(sup.ensure_running(process("/bin/worker")).await);

    assert!(fake.exit(&first, JobOutcome::Failed(2)));
    assert!(eventually(|| fake.launch_count("/bin/worker") == 2).await);

    let second = fake.last_instance_of("/bin/worker").unwrap();
    assert_ne!(first, second);
    assert_eq!(sup.registry().count(), 1);
    assert!(sup.registry().snapshot().iter().any(|(id, _)| *id == second));

    assert!(fake.exit(&second, JobOutcome::Failed(2)));
    assert!(eventually(|| fake.launch_count("/bin/worker") == 3).await);

    settle().await;
    assert_eq!(fake.launch_count("/bin/worker"), 3);
    assert_eq!(sup.stats().restarts, 2);
    assert_eq!(sup.registry().count(), 1);
}

#[tokio::test]
async fn successful_exit_is_not_relaunched() {
    init_tracing();
    let fake = FakeLauncher::processes();
    let sup = supervisor(&fake);

    let id = started(sup.ensure_running(process("/bin/once")).await);
    assert!(fake.exit(&id, JobOutcome::Success));
    assert!(eventually(|| sup.registry().is_empty()).await);

    settle().await;
    assert_eq!(fake.launch_count("/bin/once"), 1);
    assert_eq!(sup.stats().restarts, 0);

    // The claim is released, so the next tick launches it again.
    assert!(matches!(
        sup.ensure_running(process("/bin/once")).await,
        EnsureOutcome::Started(_)
    ));
}

#[tokio::test]
async fn failed_exit_while_shutting_down_is_not_relaunched() {
    init_tracing();
    let fake = FakeLauncher::processes();
    let sup = supervisor(&fake);

    let id = started(sup.ensure_running(process("/bin/worker")).await);
    sup.begin_shutdown();
    assert!(fake.exit(&id, JobOutcome::Failed(1)));

    assert!(eventually(|| sup.registry().is_empty()).await);
    settle().await;
    assert_eq!(fake.launch_count("/bin/worker"), 1);
    assert_eq!(sup.stats().restarts, 0);
    assert_eq!(
        sup.ensure_running(process("/bin/worker")).await,
        EnsureOutcome::ShuttingDown
    );
}

#[tokio::test]
async fn bounded_policy_stops_relaunching_after_cap() {
    init_tracing();
    let fake = FakeLauncher::processes();
    let sup = supervisor(&fake);
    let job = Arc::new(JobDescriptor::process("/bin/flaky", vec![]).with_restart(RestartPolicy {
        max_consecutive: Some(1),
        ..RestartPolicy::default()
    }));

    let first = started(sup.ensure_running(job).await);
    fake.exit(&first, JobOutcome::Failed(1));
    assert!(eventually(|| fake.launch_count("/bin/flaky") == 2).await);

    let second = fake.last_instance_of("/bin/flaky").unwrap();
    fake.exit(&second, JobOutcome::Failed(1));
    assert!(eventually(|| sup.registry().is_empty()).await);

    settle().await;
    assert_eq!(fake.launch_count("/bin/flaky"), 2);
}

#[tokio::test]
async fn terminate_retries_until_the_kill_sticks() {
    init_tracing();
    let capture = EventCapture::new();
    let _guard = capture.install();

    let fake = FakeLauncher::processes();
    let sup = supervisor(&fake);
    let id = started(sup.ensure_running(process("/bin/stubborn")).await);

    fake.refuse_next_kills(2);
    assert_eq!(sup.terminate(&id).await, TerminateOutcome::Terminated);

    assert_eq!(fake.kill_calls(), 3);
    assert_eq!(capture.count("job-terminate-failure"), 2);
    assert_eq!(capture.count("job-terminate"), 1);
    assert!(sup.registry().is_empty());

    // A second terminate finds nothing.
    assert_eq!(sup.terminate(&id).await, TerminateOutcome::NotFound);
}

#[tokio::test]
async fn terminate_gives_up_after_kill_attempts() {
    init_tracing();
    let fake = FakeLauncher::processes();
    let sup = Arc::new(Supervisor::new(Arc::new(fake.clone())).with_options(SupervisorOptions {
        kill_attempts: 3,
        kill_retry_delay: Duration::from_millis(1),
    }));
    let id = started(sup.ensure_running(process("/bin/immortal")).await);

    fake.refuse_next_kills(100);
    assert_eq!(sup.terminate(&id).await, TerminateOutcome::Failed);
    assert_eq!(fake.kill_calls(), 3);
    assert_eq!(sup.stats().termination_failures, 1);

    // Still alive, so still tracked.
    let entries = sup.registry().snapshot();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, id);
    assert_eq!(entries[0].1.state(), HandleState::Terminating);
}

#[tokio::test]
async fn unkillable_instance_is_reported_as_remaining_at_shutdown() {
    init_tracing();
    let fake = FakeLauncher::processes();
    let sup = Arc::new(Supervisor::new(Arc::new(fake.clone())).with_options(SupervisorOptions {
        kill_attempts: 2,
        kill_retry_delay: Duration::from_millis(1),
    }));
    let id = started(sup.ensure_running(process("/bin/immortal")).await);
    fake.refuse_next_kills(100);

    let report = ShutdownCoordinator::new(Duration::from_millis(100))
        .shutdown(&[Arc::clone(&sup)])
        .await;
    assert!(report.timed_out);
    assert_eq!(report.terminated, 0);
    assert_eq!(report.remaining, 1);
    assert!(sup.registry().contains_job("/bin/immortal"));

    // A later attempt can still reach it through the restored handle.
    fake.refuse_next_kills(0);
    assert_eq!(sup.terminate(&id).await, TerminateOutcome::Terminated);
    assert!(sup.registry().is_empty());
}

#[tokio::test]
async fn timed_out_shutdown_counts_only_its_own_terminations() {
    init_tracing();
    let fake = FakeLauncher::processes();
    let sup = Arc::new(Supervisor::new(Arc::new(fake.clone())).with_options(SupervisorOptions {
        kill_attempts: 2,
        kill_retry_delay: Duration::from_millis(1),
    }));

    // Terminated before shutdown; must not show up in the report.
    let early = started(sup.ensure_running(process("/bin/early")).await);
    assert_eq!(sup.terminate(&early).await, TerminateOutcome::Terminated);

    // Launched in this order, so the sweep reaches the stubborn one first
    // and it eats both refusals.
    started(sup.ensure_running(process("/bin/stubborn")).await);
    started(sup.ensure_running(process("/bin/plain")).await);
    fake.refuse_next_kills(2);

    let report = ShutdownCoordinator::new(Duration::from_millis(100))
        .shutdown(&[Arc::clone(&sup)])
        .await;
    assert!(report.timed_out);
    assert_eq!(report.terminated, 1);
    assert_eq!(report.remaining, 1);
    assert_eq!(sup.stats().terminations, 2);
}

#[tokio::test]
async fn instance_registered_after_the_shutdown_sweep_terminates_itself() {
    init_tracing();
    let fake = FakeLauncher::processes();
    fake.launch_delay(Duration::from_millis(100));
    let sup = supervisor(&fake);

    let launching = {
        let sup = Arc::clone(&sup);
        tokio::spawn(async move { sup.ensure_running(process("/bin/late")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The launch is still in flight, so the sweep finds nothing to kill.
    let report = ShutdownCoordinator::new(Duration::from_secs(1))
        .shutdown(&[Arc::clone(&sup)])
        .await;
    assert_eq!(report.terminated, 0);
    assert_eq!(report.remaining, 0);

    let id = started(launching.await.unwrap());
    assert!(eventually(|| fake.killed() == vec![id.clone()] && sup.registry().is_empty()).await);
    assert_eq!(sup.stats().terminations, 1);
    assert_eq!(fake.launch_count("/bin/late"), 1);
}

#[tokio::test]
async fn terminate_all_empties_the_registry() {
    init_tracing();
    let fake = FakeLauncher::processes();
    let sup = supervisor(&fake);

    for path in ["/bin/a", "/bin/b", "/bin/c"] {
        started(sup.ensure_running(process(path)).await);
    }
    assert_eq!(sup.registry().count(), 3);

    assert_eq!(sup.terminate_all().await, 3);
    assert_eq!(sup.registry().count(), 0);
    assert_eq!(fake.killed().len(), 3);

    // Idempotent.
    assert_eq!(sup.terminate_all().await, 0);
}

#[tokio::test]
async fn natural_exit_racing_termination_is_handled_once() {
    init_tracing();
    let fake = FakeLauncher::processes();
    let sup = supervisor(&fake);
    let id = started(sup.ensure_running(process("/bin/racer")).await);

    // Exit and terminate before the wait task gets to run.
    fake.exit(&id, JobOutcome::Failed(1));
    let outcome = sup.terminate(&id).await;
    assert!(
        matches!(outcome, TerminateOutcome::Terminated | TerminateOutcome::AlreadyExited),
        "got {outcome:?}"
    );

    settle().await;
    assert!(sup.registry().is_empty());
    assert_eq!(fake.launch_count("/bin/racer"), 1, "terminated job must not be relaunched");
}

#[tokio::test]
async fn launch_failure_is_reported_and_retried_later() {
    init_tracing();
    let fake = FakeLauncher::processes();
    fake.fail_launches_of("/bin/missing");
    let sup = supervisor(&fake);

    assert_eq!(
        sup.ensure_running(process("/bin/missing")).await,
        EnsureOutcome::LaunchFailed
    );
    assert_eq!(
        sup.ensure_running(process("/bin/missing")).await,
        EnsureOutcome::LaunchFailed
    );
    assert!(sup.registry().is_empty());
    assert_eq!(sup.stats().launch_failures, 2);
}

#[tokio::test]
async fn rejected_script_is_never_registered_and_logged_once() {
    init_tracing();
    let capture = EventCapture::new();
    let _guard = capture.install();

    let fake = FakeLauncher::scripts();
    let gate = RecordingGate::rejecting("unsigned");
    let sup = Arc::new(
        Supervisor::new(Arc::new(fake.clone())).with_gate(Arc::new(gate.clone())),
    );
    let job = Arc::new(JobDescriptor::script("/jobs/report.sh", true));

    for _ in 0..3 {
        assert_eq!(sup.ensure_running(Arc::clone(&job)).await, EnsureOutcome::Rejected);
    }

    assert!(sup.registry().is_empty());
    assert!(fake.launched().is_empty());
    assert_eq!(gate.calls(), 1);
    assert_eq!(capture.count("job-rejected"), 1);
    assert_eq!(sup.stats().rejections, 1);
}

#[tokio::test]
async fn accepted_script_runs_under_its_path() {
    init_tracing();
    let fake = FakeLauncher::scripts();
    let gate = RecordingGate::accepting();
    let sup = Arc::new(
        Supervisor::new(Arc::new(fake.clone())).with_gate(Arc::new(gate.clone())),
    );
    let job = Arc::new(JobDescriptor::script("/jobs/report.sh", true));

    let id = started(sup.ensure_running(Arc::clone(&job)).await);
    assert_eq!(id, InstanceId::Job("/jobs/report.sh".to_string()));
    assert_eq!(gate.calls(), 1);

    // Scripts are not relaunched on failure; the next tick picks them up.
    fake.exit(&id, JobOutcome::Failed(1));
    assert!(eventually(|| sup.registry().is_empty()).await);
    assert!(matches!(sup.ensure_running(job).await, EnsureOutcome::Started(_)));
    assert_eq!(fake.launch_count("/jobs/report.sh"), 2);
}

#[tokio::test]
async fn signature_required_without_gate_is_rejected() {
    init_tracing();
    let fake = FakeLauncher::scripts();
    let sup = supervisor(&fake);
    let job = Arc::new(JobDescriptor::script("/jobs/report.sh", true));

    assert_eq!(sup.ensure_running(job).await, EnsureOutcome::Rejected);
    assert!(fake.launched().is_empty());
}
