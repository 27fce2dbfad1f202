// tests/host_e2e.rs

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use common::{eventually, init_tracing, process, supervisor};

use jobkeeper::host::{Host, HostExit, HostOptions};
use jobkeeper::job::JobDescriptor;
use jobkeeper::supervisor::Supervisor;
use jobkeeper_test_utils::builders::ConfigFileBuilder;
use jobkeeper_test_utils::capture::EventCapture;
use jobkeeper_test_utils::fake_launcher::{FakeLauncher, RecordingGate};

fn options(interval: Duration) -> HostOptions {
    HostOptions {
        service_name: "jobkeeper-test".to_string(),
        dispatch_interval: interval,
        grace_period: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn two_jobs_run_then_cancel_leaves_nothing_behind() {
    init_tracing();
    let fake = FakeLauncher::processes();
    let sup = supervisor(&fake);
    let cancel = CancellationToken::new();

    let host = Host::new(options(Duration::from_secs(3600))).with_jobs(
        Arc::clone(&sup),
        vec![
            process("A"),
            Arc::new(JobDescriptor::process("B", vec!["--x".to_string()])),
        ],
    );
    let run = tokio::spawn(host.run(cancel.clone()));

    assert!(eventually(|| sup.registry().count() == 2).await);

    cancel.cancel();
    let exit = timeout(Duration::from_secs(3), run).await.unwrap().unwrap();

    assert_eq!(exit.code(), 0);
    assert!(matches!(exit, HostExit::Clean(_)));
    assert_eq!(exit.report().remaining, 0);
    assert!(!exit.report().timed_out);
    assert_eq!(sup.registry().count(), 0);
    assert_eq!(fake.killed().len(), 2);
}

#[tokio::test]
async fn cancel_during_a_slow_launch_still_terminates_the_instance() {
    init_tracing();
    let fake = FakeLauncher::processes();
    fake.launch_delay(Duration::from_millis(200));
    let sup = supervisor(&fake);
    let cancel = CancellationToken::new();

    let host = Host::new(options(Duration::from_secs(3600)))
        .with_jobs(Arc::clone(&sup), vec![process("/bin/slow")]);
    let run = tokio::spawn(host.run(cancel.clone()));

    // The first tick is immediate; cancel while its launch is in flight.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(fake.launched().is_empty());
    cancel.cancel();
    let exit = timeout(Duration::from_secs(3), run).await.unwrap().unwrap();

    assert_eq!(exit.code(), 0);
    assert_eq!(exit.report().remaining, 0);
    assert_eq!(fake.launched().len(), 1);
    assert_eq!(fake.killed().len(), 1);
    assert_eq!(sup.stats().terminations, 1);
    assert!(sup.registry().is_empty());
}

#[tokio::test]
async fn rejected_script_is_logged_once_across_ticks() {
    init_tracing();
    let capture = EventCapture::new();
    let _guard = capture.install();

    let fake = FakeLauncher::scripts();
    let gate = RecordingGate::rejecting("signature invalid");
    let scripts = Arc::new(Supervisor::new(Arc::new(fake.clone())).with_gate(Arc::new(gate.clone())));
    let cancel = CancellationToken::new();

    let host = Host::new(options(Duration::from_millis(10))).with_jobs(
        Arc::clone(&scripts),
        vec![Arc::new(JobDescriptor::script("/jobs/tampered.sh", true))],
    );
    let run = tokio::spawn(host.run(cancel.clone()));

    assert!(eventually(|| capture.count("job-dispatch-tick") >= 5).await);
    cancel.cancel();
    let exit = run.await.unwrap();

    assert_eq!(exit.code(), 0);
    assert_eq!(capture.count("job-rejected"), 1);
    assert!(fake.launched().is_empty());
    assert!(scripts.registry().is_empty());
}

#[tokio::test]
async fn panicking_dispatch_task_terminates_everything_and_exits_nonzero() {
    init_tracing();
    let healthy = FakeLauncher::scripts();
    let broken = FakeLauncher::processes();
    broken.panic_on_launch_of("boom");

    let scripts = supervisor(&healthy);
    let processes = supervisor(&broken);

    let host = Host::new(options(Duration::from_millis(20)))
        .with_jobs(
            Arc::clone(&scripts),
            vec![Arc::new(JobDescriptor::script("/jobs/long.sh", false))],
        )
        .with_jobs(Arc::clone(&processes), vec![process("boom")]);

    let exit = timeout(Duration::from_secs(3), host.run(CancellationToken::new()))
        .await
        .expect("a fault ends the host");

    assert!(matches!(exit, HostExit::Faulted(_)));
    assert_eq!(exit.code(), 1);
    assert!(scripts.registry().is_empty());
    assert!(processes.registry().is_empty());
}

#[tokio::test]
async fn host_with_no_jobs_stops_on_its_own() {
    init_tracing();
    let cfg = ConfigFileBuilder::new()
        .dispatch_interval(Duration::from_millis(10))
        .build();

    let exit = timeout(Duration::from_secs(2), Host::from_config(&cfg).run(CancellationToken::new()))
        .await
        .expect("no jobs means nothing to wait for");

    assert_eq!(exit.code(), 0);
    assert_eq!(exit.report().terminated, 0);
}
