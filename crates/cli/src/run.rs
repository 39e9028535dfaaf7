// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `fate run` command: one check-and-drain cycle.

use anyhow::Context;
use clap::Args;
use fate_conf::Conf;
use fate_core::{LogLevel, RecordBody};
use fate_sched::{TaskEvent, TieredTenancyScheduler};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Poll pause between liveness checks, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 10)]
    poll_ms: u64,

    /// Do not print per-task reports
    #[arg(long)]
    quiet: bool,
}

pub fn run(conf: &Conf, args: RunArgs) -> anyhow::Result<ExitCode> {
    let scheduler = TieredTenancyScheduler::new(conf)
        .context("scheduler could not start")?
        .with_poll_frequency(Duration::from_millis(args.poll_ms));

    let mut stream = scheduler.run();
    for event in stream.by_ref() {
        match event {
            TaskEvent::Ready(ready) => {
                if !args.quiet {
                    println!(
                        "{}: {} in {:.3}s",
                        ready.task.name(),
                        ready.task.outcome(),
                        ready.task.duration().as_secs_f64(),
                    );
                }
            }
            TaskEvent::InvocationFailure(failure) => {
                eprintln!("{}: {}", failure.spec.name, failure.error);
            }
            TaskEvent::Log(event) => relay_log(&event),
        }
    }

    if let Some(info) = stream.info() {
        if !args.quiet {
            println!("completed {} task(s); next check due at {:.0}", info.count, info.next);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Forward a task's log record into our own logging at its level.
fn relay_log(event: &fate_sched::TaskLogEvent) {
    let record = match event.record() {
        Ok(record) => record,
        Err(error) => {
            tracing::warn!(task = %event.spec.name, error = %error, "undecodable task log record");
            return;
        }
    };

    let body = match &record.body {
        RecordBody::Text(text) => text.clone(),
        RecordBody::Data(value) => value.to_string(),
    };

    match record.level {
        LogLevel::Debug => tracing::debug!(task = %record.task, "{body}"),
        LogLevel::Info => tracing::info!(task = %record.task, "{body}"),
        LogLevel::Warning => tracing::warn!(task = %record.task, "{body}"),
        LogLevel::Error | LogLevel::Critical => tracing::error!(task = %record.task, "{body}"),
    }
}
