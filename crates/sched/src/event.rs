// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler's public output: an ordered stream of task events.
//!
//! Events for a single task arrive in the order they occurred: log records
//! in stderr byte order, with the ready event strictly after the last log
//! record. The stream's terminal summary is exposed once it is exhausted.

use fate_conf::TaskSpec;
use fate_core::{LogRecord, LogRecordDecodeError, LogsDecodingError, TaskOutcome};
use std::sync::Arc;
use std::time::Duration;

/// Terminal summary of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedInfo {
    /// Completed tasks, counting invocation failures.
    pub count: usize,
    /// The earliest instant any task fires next (epoch seconds).
    pub next: f64,
}

/// The finished record of an executed task.
#[derive(Debug, Clone)]
pub struct CompletedTask {
    pub spec: Arc<TaskSpec>,
    pub returncode: i32,
    pub pid: i32,
    /// Process group the task led (equal to `pid` at spawn).
    pub pgid: i32,
    /// Epoch seconds.
    pub started: f64,
    pub ended: f64,
    /// Deadline, when a timeout was configured.
    pub expires: Option<f64>,
    /// When SIGTERM was first delivered, if it was.
    pub terminated: Option<f64>,
    /// When SIGKILL was delivered, if it was.
    pub killed: Option<f64>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CompletedTask {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn outcome(&self) -> TaskOutcome {
        TaskOutcome::from_code(self.returncode)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64((self.ended - self.started).max(0.0))
    }

    /// When the task was forcibly stopped, if it was.
    pub fn stopped(&self) -> Option<f64> {
        self.killed.or(self.terminated)
    }

    /// Decode the task's whole stderr stream.
    pub fn logs(&self) -> Result<Vec<LogRecord>, LogsDecodingError> {
        LogRecord::parse_stream(&self.stderr, self.spec.log_format, &self.spec.name)
    }
}

/// One complete stderr record, emitted as it arrived.
#[derive(Debug, Clone)]
pub struct TaskLogEvent {
    pub spec: Arc<TaskSpec>,
    pub message: Vec<u8>,
}

impl TaskLogEvent {
    /// Materialize the record; decode failures surface here, on demand.
    pub fn record(&self) -> Result<LogRecord, LogRecordDecodeError> {
        LogRecord::parse(&self.message, self.spec.log_format, &self.spec.name)
    }
}

/// A task whose command could not be invoked.
#[derive(Debug, Clone)]
pub struct TaskInvocationFailureEvent {
    pub spec: Arc<TaskSpec>,
    pub error: String,
}

/// A task's process terminated.
#[derive(Debug, Clone)]
pub struct TaskReadyEvent {
    pub task: CompletedTask,
}

impl TaskReadyEvent {
    pub fn returncode(&self) -> i32 {
        self.task.returncode
    }
}

/// An item of the scheduler's event stream.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Log(TaskLogEvent),
    InvocationFailure(TaskInvocationFailureEvent),
    Ready(TaskReadyEvent),
}

impl TaskEvent {
    /// The spec of the task this event concerns.
    pub fn spec(&self) -> &Arc<TaskSpec> {
        match self {
            TaskEvent::Log(event) => &event.spec,
            TaskEvent::InvocationFailure(event) => &event.spec,
            TaskEvent::Ready(event) => &event.task.spec,
        }
    }

    pub fn task_name(&self) -> &str {
        &self.spec().name
    }
}
