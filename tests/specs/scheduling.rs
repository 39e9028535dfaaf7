//! Which tasks run, when, and in what cohorts.

use crate::prelude::*;
use fate_core::{FakeClock, TaskOutcome};
use fate_sched::TaskEvent;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn due_task_runs_once() {
    let sandbox = sandbox(r#"
        [run-me]
        exec = ["echo", "done"]
        schedule = "H/5 * * * *"
    "#);
    let scheduler = scheduler(&sandbox);
    set_last_check(&scheduler, 3600.0);

    let (outcome, logs) = capture_logs(|| {
        let mut stream = scheduler.run();
        let events: Vec<TaskEvent> = stream.by_ref().collect();
        (events, stream.info().unwrap())
    });
    let (events, info) = outcome;

    assert_eq!(events.len(), 1);
    let TaskEvent::Ready(ready) = &events[0] else {
        panic!("expected a ready event, got {:?}", events[0]);
    };
    assert_eq!(ready.task.name(), "run-me");
    assert_eq!(ready.returncode(), 0);
    assert_eq!(ready.task.stdout, b"done\n");
    assert_eq!(ready.task.stderr, b"");
    assert_eq!(info.count, 1);

    assert!(line_with(&logs, &["completed=1", "total=1", "active=0"]));
}

#[test]
fn if_condition_suppresses_the_task() {
    std::env::remove_var("FATE_SPECS_TESTY");
    let sandbox = sandbox(r#"
        [skip-me]
        exec = ["echo", "done"]
        schedule = "H/5 * * * *"
        if = 'env.FATE_SPECS_TESTY | default("0") | int == 1'
    "#);
    let scheduler = scheduler(&sandbox);
    set_last_check(&scheduler, 3600.0);

    let (events, logs) = capture_logs(|| scheduler.run().collect::<Vec<_>>());

    assert!(events.is_empty());
    assert!(line_with(
        &logs,
        &["skipped: suppressed by if/unless condition"]
    ));
}

#[test]
fn first_run_only_establishes_the_reference_point() {
    let sandbox = sandbox(r#"
        [run-me]
        exec = ["echo", "done"]
        schedule = "* * * * *"
    "#);
    let scheduler = scheduler(&sandbox);

    let mut stream = scheduler.run();
    assert!(stream.next().is_none());
    assert_eq!(stream.info().unwrap().count, 0);
    assert!(scheduler.state_dir().read_last_check().unwrap().is_some());
}

#[test]
fn every_completion_or_failure_is_counted() {
    let sandbox = sandbox(r#"
        [works]
        exec = ["echo", "ok"]
        schedule = "* * * * *"

        [fails]
        shell = "exit 7"
        schedule = "* * * * *"

        [ghost]
        exec = ["fate-no-such-program-exists"]
        schedule = "* * * * *"
    "#);
    let scheduler = scheduler(&sandbox);
    set_last_check(&scheduler, 3600.0);

    let mut stream = scheduler.run();
    let events: Vec<TaskEvent> = stream.by_ref().collect();

    let ready = events
        .iter()
        .filter(|event| matches!(event, TaskEvent::Ready(_)))
        .count();
    let failed = events
        .iter()
        .filter(|event| matches!(event, TaskEvent::InvocationFailure(_)))
        .count();
    assert_eq!(ready, 2);
    assert_eq!(failed, 1);
    assert_eq!(stream.info().unwrap().count, ready + failed);

    for event in &events {
        match event {
            TaskEvent::Ready(ready) if ready.task.name() == "works" => {
                assert_eq!(ready.task.outcome(), TaskOutcome::Ok);
            }
            TaskEvent::Ready(ready) => {
                assert_eq!(ready.task.name(), "fails");
                assert_eq!(ready.task.outcome(), TaskOutcome::Error(7));
            }
            TaskEvent::InvocationFailure(failure) => {
                assert_eq!(failure.spec.name, "ghost");
                assert!(failure.error.contains("command not found on path"));
            }
            TaskEvent::Log(event) => panic!("unexpected log event from {}", event.spec.name),
        }
    }
}

#[test]
fn refill_recreates_the_primary_cohort() {
    // the minute-zero task blocks on a flag file, keeping the run alive
    // while the loop clock crosses minute one; the refill then finds the
    // primary cohort drained and recreates it for the newly-due task
    let flag_dir = tempfile::tempdir().unwrap();
    let flag = flag_dir.path().join("release");
    let tasks = format!(
        r#"
            [runs-long]
            shell = 'while [ ! -e {flag} ]; do sleep 0.01; done; echo early'
            schedule = "0 * * * *"

            [runs-late]
            exec = ["echo", "done"]
            schedule = "1 * * * *"
        "#,
        flag = flag.display()
    );
    let sandbox = sandbox(&tasks);

    let clock = FakeClock::new([3600.001, 3660.0]).with_step(0.002);
    let scheduler = scheduler(&sandbox).with_clock(Arc::new(clock.clone()));
    scheduler.state_dir().write_check(3540.0).unwrap();

    let release = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        std::fs::write(&flag, b"").unwrap();
    });

    let (outcome, logs) = capture_logs(|| {
        let mut stream = scheduler.run();

        let first = stream.next().unwrap();
        let TaskEvent::Ready(first) = &first else {
            panic!("expected ready event, got {first:?}");
        };
        assert_eq!(first.task.name(), "runs-late");
        assert_eq!(first.returncode(), 0);
        assert_eq!(first.task.stdout, b"done\n");

        let rest: Vec<TaskEvent> = stream.by_ref().collect();
        (rest, stream.info().unwrap())
    });
    release.join().unwrap();
    let (rest, info) = outcome;

    assert_eq!(rest.len(), 1);
    let TaskEvent::Ready(second) = &rest[0] else {
        panic!("expected ready event, got {:?}", rest[0]);
    };
    assert_eq!(second.task.name(), "runs-long");
    assert_eq!(second.task.stdout, b"early\n");

    // cohort 0 enqueued twice: the initial check, then the refill
    assert_eq!(
        count_with(&logs, &["enqueued cohort", "cohort=0", "size=1"]),
        2
    );
    assert!(line_with(&logs, &["launched pool", "active=1"]));
    assert!(line_with(&logs, &["expanded pool", "active=2"]));
    assert!(line_with(&logs, &["filled pool", "active=2"]));

    assert_eq!(info.count, 2);
    // one hour past the previous boundary
    assert_eq!(info.next, 7200.0);
}
