// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tiered-tenancy execution loop.
//!
//! Single-threaded and cooperative: one thread owns every queue, gate,
//! counter, and pipe (the stdout drain threads excepted), and all events
//! are produced in poll order. The public surface is [`EventStream`], a
//! lazy iterator whose `next` advances the loop just far enough to produce
//! the next event; exhausting it finalizes the run and exposes the
//! summary.

use crate::cohort::CohortQueue;
use crate::event::{
    CompletedTask, SchedInfo, TaskEvent, TaskInvocationFailureEvent, TaskLogEvent, TaskReadyEvent,
};
use crate::spawn::SpawnedTask;
use crate::state_dir::StateDir;
use crate::tenancy::TenancyGate;
use crate::timing::CheckTiming;
use chrono::TimeZone;
use fate_conf::schedule::NEXT_MAX_SECONDS;
use fate_conf::{Conf, TaskSpec};
use fate_core::{Clock, SystemClock};
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default pause between poll rounds.
pub const DEFAULT_POLL_FREQUENCY: Duration = Duration::from_millis(10);

/// The scheduler could not be constructed.
#[derive(Debug, Error)]
pub enum SchedError {
    #[error("state directory could not be initialized: {0}")]
    StateDir(#[from] io::Error),
}

/// Tiered-tenancy task scheduler.
///
/// Construction realizes the state directory for the configuration set;
/// each [`Self::run`] performs one check-and-drain cycle.
pub struct TieredTenancyScheduler {
    specs: Vec<Arc<TaskSpec>>,
    state_dir: StateDir,
    clock: Arc<dyn Clock>,
    poll_frequency: Duration,
}

impl TieredTenancyScheduler {
    pub fn new(conf: &Conf) -> Result<Self, SchedError> {
        let state_dir = StateDir::open(&conf.prefix.state, &conf.paths)?;
        Ok(Self {
            specs: conf.tasks.values().cloned().map(Arc::new).collect(),
            state_dir,
            clock: Arc::new(SystemClock),
            poll_frequency: DEFAULT_POLL_FREQUENCY,
        })
    }

    /// Substitute the wall clock (tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Tighten or relax the poll pause.
    pub fn with_poll_frequency(mut self, poll_frequency: Duration) -> Self {
        self.poll_frequency = poll_frequency;
        self
    }

    pub fn state_dir(&self) -> &StateDir {
        &self.state_dir
    }

    /// Perform one check-and-drain cycle, yielding events as they occur.
    pub fn run(&self) -> EventStream<'_> {
        EventStream::new(self)
    }
}

#[derive(Debug)]
struct ActiveEntry {
    id: usize,
    task: SpawnedTask,
    /// Scan offset into the task's stderr buffer for complete records.
    log_offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Draining,
    Done,
}

/// Ordered, single-consumer stream of one run's events.
pub struct EventStream<'sched> {
    sched: &'sched TieredTenancyScheduler,
    timing: CheckTiming,
    queue: CohortQueue,
    gate: TenancyGate,
    active: Vec<ActiveEntry>,
    pending: VecDeque<TaskEvent>,
    /// Tasks already enqueued, launched, or completed this run.
    seen: Vec<bool>,
    completed: usize,
    total: usize,
    /// Earliest upcoming fire among unseen tasks; crossing it triggers a
    /// refill. Recomputed after each check, which keeps refills to one per
    /// distinct fire instant.
    next_refill: Option<f64>,
    phase: Phase,
    info: Option<SchedInfo>,
}

impl<'sched> EventStream<'sched> {
    fn new(sched: &'sched TieredTenancyScheduler) -> Self {
        let limits = sched.specs.iter().map(|spec| spec.tenancy).collect();
        Self {
            sched,
            timing: CheckTiming::new(),
            queue: CohortQueue::new(),
            gate: TenancyGate::new(limits),
            active: Vec::new(),
            pending: VecDeque::new(),
            seen: vec![false; sched.specs.len()],
            completed: 0,
            total: 0,
            next_refill: None,
            phase: Phase::Start,
            info: None,
        }
    }

    /// The run summary; present once the stream is exhausted.
    pub fn info(&self) -> Option<SchedInfo> {
        self.info
    }

    fn initial_check(&mut self) {
        let clock = self.sched.clock.as_ref();
        let time_check = self.timing.time_check(clock);
        let last_check = self.read_last_check();
        let due = self.collect_due(last_check, time_check);
        self.enqueue(due);
        self.update_next_refill(time_check);
    }

    fn read_last_check(&mut self) -> Option<f64> {
        match self
            .timing
            .last_check(&self.sched.state_dir, self.sched.clock.as_ref())
        {
            Ok(last) => last,
            Err(err) => {
                tracing::error!(error = %err, "check marker unavailable");
                None
            }
        }
    }

    /// Tasks whose schedule fires in `(last, now]` and whose guards
    /// permit, in configuration order.
    fn collect_due(&self, last_check: Option<f64>, time_check: f64) -> Vec<usize> {
        let Some(last) = last_check else {
            // first run: nothing is due; the persisted mark gives the next
            // run its reference point
            return Vec::new();
        };

        let mut due = Vec::new();
        for (id, spec) in self.sched.specs.iter().enumerate() {
            if !spec.scheduled(last, time_check) {
                continue;
            }
            match spec.guard.evaluate_env() {
                Ok(true) => due.push(id),
                Ok(false) => {
                    tracing::info!(task = %spec.name, "skipped: suppressed by if/unless condition");
                }
                Err(error) => {
                    tracing::warn!(task = %spec.name, key = error.key, "{error}");
                }
            }
        }
        due
    }

    fn enqueue(&mut self, due: Vec<usize>) {
        if due.is_empty() {
            return;
        }
        for id in &due {
            self.seen[*id] = true;
        }
        let size = due.len();
        let cohort = self.queue.enqueue(due);
        tracing::debug!(cohort, size, "enqueued cohort");
    }

    fn update_next_refill(&mut self, base: f64) {
        self.next_refill = self
            .sched
            .specs
            .iter()
            .enumerate()
            .filter(|(id, _)| !self.seen[*id])
            .filter_map(|(_, spec)| spec.next_after(base))
            .fold(None, |soonest: Option<f64>, fire| {
                Some(soonest.map_or(fire, |at| at.min(fire)))
            });
    }

    /// One poll round: sleep, poll every active task (emitting each
    /// task's events before the next task's), recheck the clock for a
    /// refill, then launch whatever the gate admits.
    fn step(&mut self) {
        let clock = self.sched.clock.as_ref();
        clock.sleep(self.sched.poll_frequency);
        self.poll_active();
        self.maybe_refill();
        self.launch();
    }

    fn poll_active(&mut self) {
        let mut index = 0;
        while index < self.active.len() {
            let (spec, records, code) = {
                let entry = &mut self.active[index];
                let code = entry.task.poll(self.sched.clock.as_ref());
                let (records, offset) =
                    fate_core::log::complete_records(entry.task.stderr_bytes(), entry.log_offset);
                entry.log_offset = offset;
                (entry.task.spec().clone(), records, code)
            };

            for message in records {
                self.pending.push_back(TaskEvent::Log(TaskLogEvent {
                    spec: spec.clone(),
                    message,
                }));
            }

            if code.is_some() {
                let entry = self.active.remove(index);
                self.complete(entry);
            } else {
                index += 1;
            }
        }
    }

    fn complete(&mut self, entry: ActiveEntry) {
        let ActiveEntry { id, task, .. } = entry;
        self.gate.release(id);
        self.completed += 1;

        let pid = task.pid().as_raw();
        let pgid = task.pgid().as_raw();
        let started = task.started_at();
        let ended = task.ended_at().unwrap_or(started);
        let expires = task.expires_at();
        let terminated = task.terminated_at();
        let killed = task.killed_at();
        let (spec, returncode, stdout, stderr) = task.into_parts();

        tracing::debug!(
            task = %spec.name,
            completed = self.completed,
            total = self.total,
            active = self.active.len(),
            "task completed"
        );

        let completed = CompletedTask {
            spec,
            returncode: returncode.unwrap_or(-1),
            pid,
            pgid,
            started,
            ended,
            expires,
            terminated,
            killed,
            stdout,
            stderr,
        };
        self.write_result(&completed);
        self.pending
            .push_back(TaskEvent::Ready(TaskReadyEvent { task: completed }));
    }

    fn write_result(&self, task: &CompletedTask) {
        let Some(dir) = &task.spec.result_path else {
            return;
        };

        let (extension, errors) =
            fate_core::detect_extension(&task.stdout, &task.spec.result_format);

        let seconds = task.ended.floor();
        let nanos = ((task.ended - seconds) * 1e9).round() as u32;
        let Some(at) = chrono::Utc
            .timestamp_opt(seconds as i64, nanos.min(999_999_999))
            .single()
        else {
            tracing::error!(task = %task.spec.name, "result timestamp out of range");
            return;
        };
        let identifier = fate_core::result_identifier(dir, &task.spec.name, at);

        if !errors.is_empty() {
            let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
            tracing::error!(
                task = %task.spec.name,
                identifier = %identifier.display(),
                errors = ?details,
                "result rejected by configured format; writing without suffix"
            );
        }

        let path = if extension.is_empty() {
            identifier
        } else {
            PathBuf::from(format!("{}{extension}", identifier.display()))
        };

        if let Err(err) = std::fs::create_dir_all(dir)
            .and_then(|()| std::fs::write(&path, &task.stdout))
        {
            tracing::error!(
                task = %task.spec.name,
                path = %path.display(),
                error = %err,
                "result file could not be written"
            );
        }
    }

    fn maybe_refill(&mut self) {
        let Some(fire) = self.next_refill else { return };
        let clock = self.sched.clock.as_ref();
        if clock.now() < fire {
            return;
        }

        self.timing.reset();
        let time_check = self.timing.time_check(clock);
        let last_check = self.read_last_check();
        let due = self.collect_due(last_check, time_check);
        let fresh: Vec<usize> = due.into_iter().filter(|id| !self.seen[*id]).collect();
        self.enqueue(fresh);
        self.update_next_refill(time_check);
    }

    fn launch(&mut self) {
        let clock = self.sched.clock.as_ref();
        let mut launched = 0usize;

        while let Some(id) = self.queue.pop_next(&self.gate) {
            let spec = self.sched.specs[id].clone();
            let state = match self.sched.state_dir.read_task_state(&spec.name) {
                Ok(state) => state,
                Err(err) => {
                    tracing::warn!(task = %spec.name, error = %err, "persisted state unreadable; starting empty");
                    Vec::new()
                }
            };
            let state_path = self.sched.state_dir.task_state_path(&spec.name);

            match SpawnedTask::spawn(spec.clone(), state, state_path, clock) {
                Ok(task) => {
                    self.gate.acquire(id);
                    self.total += 1;
                    self.active.push(ActiveEntry {
                        id,
                        task,
                        log_offset: 0,
                    });
                    launched += 1;
                    if self.active.len() == 1 {
                        tracing::debug!(task = %spec.name, active = 1usize, "launched pool");
                    } else {
                        tracing::debug!(task = %spec.name, active = self.active.len(), "expanded pool");
                    }
                }
                Err(error) => {
                    // invocation failures consume no tenancy
                    self.completed += 1;
                    tracing::warn!(task = %spec.name, error = %error, "task could not be invoked");
                    self.pending
                        .push_back(TaskEvent::InvocationFailure(TaskInvocationFailureEvent {
                            spec,
                            error: error.to_string(),
                        }));
                }
            }
        }

        if launched > 0 && self.active.len() > 1 {
            tracing::debug!(active = self.active.len(), "filled pool");
        }
    }

    fn finalize(&mut self) {
        let clock = self.sched.clock.as_ref();
        let time_check = self.timing.time_check(clock);
        let next = self
            .sched
            .specs
            .iter()
            .filter_map(|spec| spec.next_after(time_check))
            .fold(None, |soonest: Option<f64>, fire| {
                Some(soonest.map_or(fire, |at| at.min(fire)))
            })
            .unwrap_or(time_check + NEXT_MAX_SECONDS);

        self.info = Some(SchedInfo {
            count: self.completed,
            next,
        });
        tracing::debug!(
            completed = self.completed,
            total = self.total,
            active = 0usize,
            next,
            "schedule complete"
        );
    }
}

impl Iterator for EventStream<'_> {
    type Item = TaskEvent;

    fn next(&mut self) -> Option<TaskEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            match self.phase {
                Phase::Start => {
                    self.initial_check();
                    self.launch();
                    self.phase = Phase::Draining;
                }
                Phase::Draining => {
                    if self.active.is_empty() && self.queue.is_empty() {
                        self.finalize();
                        self.phase = Phase::Done;
                    } else {
                        self.step();
                    }
                }
                Phase::Done => return None,
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
