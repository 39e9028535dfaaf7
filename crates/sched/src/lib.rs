// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fate-sched: the tiered-tenancy scheduler and task execution engine.
//!
//! Given a realized configuration and the persisted time of the previous
//! check, the scheduler determines which tasks are due, executes them as
//! process-group children under per-name tenancy ceilings, streams their
//! stdin/stdout/stderr/state pipes without blocking, enforces escalating
//! timeouts, and yields an ordered stream of events terminated by a run
//! summary.

pub mod cohort;
pub mod event;
pub mod pipes;
pub mod scheduler;
pub mod spawn;
pub mod state_dir;
pub mod tenancy;
pub mod timing;

pub use cohort::CohortQueue;
pub use event::{
    CompletedTask, SchedInfo, TaskEvent, TaskInvocationFailureEvent, TaskLogEvent, TaskReadyEvent,
};
pub use scheduler::{EventStream, SchedError, TieredTenancyScheduler};
pub use spawn::{SpawnError, SpawnedTask};
pub use state_dir::StateDir;
pub use tenancy::TenancyGate;
pub use timing::CheckTiming;
