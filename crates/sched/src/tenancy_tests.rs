// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn unbounded_always_admits() {
    let mut gate = TenancyGate::new(vec![None]);
    for _ in 0..100 {
        assert!(gate.may(0));
        gate.acquire(0);
    }
    assert_eq!(gate.running(0), 100);
}

#[test]
fn ceiling_blocks_at_the_limit() {
    let mut gate = TenancyGate::new(vec![Some(2)]);
    assert!(gate.may(0));
    gate.acquire(0);
    assert!(gate.may(0));
    gate.acquire(0);
    assert!(!gate.may(0));

    gate.release(0);
    assert!(gate.may(0));
}

#[test]
fn tasks_are_independent() {
    let mut gate = TenancyGate::new(vec![Some(1), None]);
    gate.acquire(0);
    assert!(!gate.may(0));
    assert!(gate.may(1));
}

#[test]
fn release_saturates_at_zero() {
    let mut gate = TenancyGate::new(vec![Some(1)]);
    gate.release(0);
    assert_eq!(gate.running(0), 0);
    assert!(gate.may(0));
}
