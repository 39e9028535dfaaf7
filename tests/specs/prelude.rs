//! Shared fixtures for the behavioral specs.

use fate_conf::{Conf, PrefixPaths};
use fate_core::{Clock, SystemClock};
use fate_sched::TieredTenancyScheduler;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// A sandboxed configuration set: conf, state, and results all live
/// under one temporary directory.
pub struct Sandbox {
    pub dir: TempDir,
    pub conf: Conf,
}

pub fn sandbox(tasks_toml: &str) -> Sandbox {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tasks.toml"), tasks_toml).unwrap();
    let conf = Conf::load(dir.path(), PrefixPaths::under(dir.path())).unwrap();
    Sandbox { dir, conf }
}

pub fn scheduler(sandbox: &Sandbox) -> TieredTenancyScheduler {
    TieredTenancyScheduler::new(&sandbox.conf)
        .unwrap()
        .with_poll_frequency(Duration::from_millis(2))
}

/// Record the previous check as `offset` seconds before now.
pub fn set_last_check(scheduler: &TieredTenancyScheduler, offset: f64) {
    let now = SystemClock.now();
    scheduler.state_dir().write_check(now - offset).unwrap();
}

#[derive(Clone, Default)]
pub struct LogSink(Arc<Mutex<Vec<u8>>>);

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with this thread's log lines captured.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, Vec<String>) {
    let sink = LogSink::default();
    let writer = sink.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .without_time()
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    let bytes = sink.0.lock().unwrap();
    let lines = String::from_utf8_lossy(&bytes)
        .lines()
        .map(String::from)
        .collect();
    (result, lines)
}

pub fn line_with(logs: &[String], parts: &[&str]) -> bool {
    logs.iter()
        .any(|line| parts.iter().all(|part| line.contains(part)))
}

pub fn count_with(logs: &[String], parts: &[&str]) -> usize {
    logs.iter()
        .filter(|line| parts.iter().all(|part| line.contains(part)))
        .count()
}
