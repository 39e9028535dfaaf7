// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_is_monotonic_enough() {
    let clock = SystemClock;
    let first = clock.now();
    let second = clock.now();
    assert!(second >= first);
    assert!(first > 1_500_000_000.0, "epoch seconds expected, got {first}");
}

#[test]
fn fake_clock_serves_queued_instants() {
    let clock = FakeClock::new([0.001, 60.001]);
    assert_eq!(clock.now(), 0.001);
    assert_eq!(clock.now(), 60.001);
}

#[test]
fn fake_clock_steps_after_queue_drains() {
    let clock = FakeClock::new([60.0]).with_step(0.002);
    assert_eq!(clock.now(), 60.0);
    assert_eq!(clock.now(), 60.002);
    assert_eq!(clock.now(), 60.004);
}

#[test]
fn fake_clock_push_extends_queue() {
    let clock = FakeClock::new([1.0]);
    clock.push(2.0);
    assert_eq!(clock.now(), 1.0);
    assert_eq!(clock.now(), 2.0);
}

#[test]
fn fake_clock_records_sleeps() {
    let clock = FakeClock::default();
    assert_eq!(clock.sleep_count(), 0);
    clock.sleep(Duration::from_millis(1));
    clock.sleep(Duration::from_millis(2));
    assert_eq!(clock.sleep_count(), 2);
    assert_eq!(clock.slept(), Duration::from_millis(3));
}

#[test]
fn clones_share_state() {
    let clock = FakeClock::new([5.0, 6.0]);
    let handle = clock.clone();
    assert_eq!(clock.now(), 5.0);
    assert_eq!(handle.now(), 6.0);
}
