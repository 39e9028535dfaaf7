//! Timeout enforcement: escalating signals against the task's whole
//! process group.

use crate::prelude::*;
use fate_core::TaskOutcome;
use fate_sched::TaskEvent;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;

fn single_ready(events: Vec<TaskEvent>) -> fate_sched::TaskReadyEvent {
    assert_eq!(events.len(), 1, "expected one event, got {events:?}");
    match events.into_iter().next().unwrap() {
        TaskEvent::Ready(ready) => ready,
        other => panic!("expected a ready event, got {other:?}"),
    }
}

#[test]
fn generous_timeout_is_a_noop() {
    let sandbox = sandbox(r#"
        [easy-timeout]
        exec = ["echo", "done"]
        schedule = "H/5 * * * *"
        timeout = 60
    "#);
    let scheduler = scheduler(&sandbox);
    set_last_check(&scheduler, 3600.0);

    let ready = single_ready(scheduler.run().collect());
    assert_eq!(ready.returncode(), 0);
    assert_eq!(ready.task.stdout, b"done\n");
    assert!(ready.task.stopped().is_none());
}

#[test]
fn expired_task_is_terminated() {
    let sandbox = sandbox(r#"
        [impossible-timeout]
        shell = "sleep 5"
        schedule = "H/5 * * * *"
        timeout = "1s"
    "#);
    let scheduler = scheduler(&sandbox);
    set_last_check(&scheduler, 3600.0);

    let ready = single_ready(scheduler.run().collect());
    assert_eq!(ready.returncode(), -(Signal::SIGTERM as i32));
    assert_eq!(ready.task.outcome(), TaskOutcome::Signaled(Signal::SIGTERM as i32));
    assert_eq!(ready.task.stdout, b"");
    assert_eq!(ready.task.stderr, b"");
    assert!(ready.task.ended >= ready.task.expires.unwrap());
    assert!(ready.task.stopped().is_some());
}

#[test]
fn misbehaving_task_is_killed_with_its_group() {
    // SIGTERM is ignored across the group; only the SIGKILL escalation
    // ends the run
    let sandbox = sandbox(r#"
        [stubborn]
        shell = "trap '' TERM; sleep 10"
        schedule = "H/5 * * * *"
        timeout = "1s"
    "#);
    let scheduler = scheduler(&sandbox);
    set_last_check(&scheduler, 3600.0);

    let ready = single_ready(scheduler.run().collect());
    assert_eq!(ready.returncode(), -(Signal::SIGKILL as i32));

    let duration = ready.task.duration().as_secs_f64();
    assert!((1.0..2.0).contains(&duration), "duration {duration}");

    assert!(ready.task.terminated.is_some());
    assert!(ready.task.killed.is_some());

    // nothing of the task's process group survives
    assert_eq!(
        killpg(Pid::from_raw(ready.task.pgid), None),
        Err(Errno::ESRCH)
    );
}
