//! Byte fidelity of task execution: stdin parameters, high-volume
//! stdout, binary results, persisted state, and result files.

use crate::prelude::*;
use fate_sched::TaskEvent;
use std::io::Read;

fn single_ready(events: Vec<TaskEvent>) -> fate_sched::TaskReadyEvent {
    assert_eq!(events.len(), 1, "expected one event, got {events:?}");
    match events.into_iter().next().unwrap() {
        TaskEvent::Ready(ready) => ready,
        other => panic!("expected a ready event, got {other:?}"),
    }
}

#[test]
fn large_stdout_is_collected_promptly() {
    let sandbox = sandbox(r#"
        [firehose]
        exec = ["head", "-c", "104857600", "/dev/zero"]
        schedule = "H/5 * * * *"
    "#);
    let scheduler = scheduler(&sandbox);
    set_last_check(&scheduler, 3600.0);

    let ready = single_ready(scheduler.run().collect());
    assert_eq!(ready.returncode(), 0);
    assert_eq!(ready.task.stdout.len(), 104_857_600);
    assert!(ready.task.stdout.iter().all(|byte| *byte == 0));
    let duration = ready.task.duration();
    assert!(duration.as_secs_f64() < 5.0, "took {duration:?}");
}

#[test]
fn binary_result_round_trips() {
    let sandbox = sandbox(r#"
        [binary]
        exec = ["gzip", "-c"]
        schedule = "H/5 * * * *"
        param = "very special characters\n\n(really)\n"
    "#);
    let scheduler = scheduler(&sandbox);
    set_last_check(&scheduler, 3600.0);

    let ready = single_ready(scheduler.run().collect());
    assert_eq!(ready.returncode(), 0);
    assert_eq!(ready.task.stderr, b"");

    let mut decoder = flate2::read::GzDecoder::new(ready.task.stdout.as_slice());
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).unwrap();
    assert_eq!(decompressed, b"very special characters\n\n(really)\n");
}

#[test]
fn state_carries_across_runs() {
    let sandbox = sandbox(r#"
        [counter]
        shell = "cat <&3 >&4; echo tick >&4"
        schedule = "H/5 * * * *"
    "#);

    let scheduler = scheduler(&sandbox);
    set_last_check(&scheduler, 3600.0);
    let first = single_ready(scheduler.run().collect());
    assert_eq!(first.returncode(), 0);

    let state_path = scheduler.state_dir().task_state_path("counter");
    assert_eq!(std::fs::read(&state_path).unwrap(), b"tick\n");

    // the second run receives the first run's state on FD 3
    set_last_check(&scheduler, 3600.0);
    let second = single_ready(scheduler.run().collect());
    assert_eq!(second.returncode(), 0);
    assert_eq!(std::fs::read(&state_path).unwrap(), b"tick\ntick\n");
}

#[test]
fn log_records_arrive_as_events_in_order() {
    let sandbox = sandbox(r#"
        [chatty]
        shell = 'printf "one\0two\0" >&2; echo finished'
        schedule = "H/5 * * * *"
    "#);
    let scheduler = scheduler(&sandbox);
    set_last_check(&scheduler, 3600.0);

    let events: Vec<TaskEvent> = scheduler.run().collect();
    assert_eq!(events.len(), 3);

    let TaskEvent::Log(first) = &events[0] else {
        panic!("expected log first, got {:?}", events[0]);
    };
    let TaskEvent::Log(second) = &events[1] else {
        panic!("expected log second, got {:?}", events[1]);
    };
    assert_eq!(first.message, b"one");
    assert_eq!(second.message, b"two");

    let TaskEvent::Ready(ready) = &events[2] else {
        panic!("expected ready last, got {:?}", events[2]);
    };
    assert_eq!(ready.task.stdout, b"finished\n");
    // the full stream parses too
    assert_eq!(ready.task.logs().unwrap().len(), 2);
}

#[test]
fn result_file_lands_beside_the_state() {
    let results_dir = tempfile::tempdir().unwrap();
    let results = results_dir.path().join("results");
    let tasks = format!(
        r#"
            [reporter]
            shell = 'echo ok: true'
            schedule = "H/5 * * * *"
            path = {{ result = "{}" }}
        "#,
        results.display()
    );
    let sandbox = sandbox(&tasks);
    let scheduler = scheduler(&sandbox);
    set_last_check(&scheduler, 3600.0);

    single_ready(scheduler.run().collect());

    let names: Vec<String> = std::fs::read_dir(&results)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("result-"));
    assert!(names[0].ends_with("-reporter.yaml"), "got {}", names[0]);
}
