// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    ok = { 0, TaskOutcome::Ok },
    retry = { 42, TaskOutcome::Retry },
    error_one = { 1, TaskOutcome::Error(1) },
    error_high = { 127, TaskOutcome::Error(127) },
    sigterm = { -15, TaskOutcome::Signaled(15) },
    sigkill = { -9, TaskOutcome::Signaled(9) },
)]
fn from_code(code: i32, expected: TaskOutcome) {
    assert_eq!(TaskOutcome::from_code(code), expected);
}

#[parameterized(
    ok = { TaskOutcome::Ok, true },
    retry = { TaskOutcome::Retry, true },
    error = { TaskOutcome::Error(1), false },
    signaled = { TaskOutcome::Signaled(9), false },
)]
fn persists_state(outcome: TaskOutcome, expected: bool) {
    assert_eq!(outcome.persists_state(), expected);
}

#[test]
fn display() {
    assert_eq!(TaskOutcome::Ok.to_string(), "ok");
    assert_eq!(TaskOutcome::Error(2).to_string(), "error (exit code 2)");
    assert_eq!(TaskOutcome::Signaled(9).to_string(), "terminated (signal 9)");
}
