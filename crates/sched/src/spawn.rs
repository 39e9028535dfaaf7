// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task process spawning and supervision.
//!
//! A spawned task runs as the leader of its own process group with four
//! well-known descriptors besides stdio: FD 3 delivers the task's
//! persisted state, FD 4 collects the state it writes back. The supervisor
//! polls liveness without blocking, escalates SIGTERM to SIGKILL on
//! timeout, and persists returned state only for successful exits.

use crate::pipes::{BufferedInput, BufferedOutput, ProgressiveOutput};
use fate_conf::TaskSpec;
use fate_core::{Clock, TaskOutcome};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use thiserror::Error;

/// Descriptor on which the child reads its persisted state.
const STATE_IN_FD: RawFd = 3;

/// Descriptor on which the child writes state back.
const STATE_OUT_FD: RawFd = 4;

/// A task command could not be invoked.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("command not found on path: {program}")]
    NotFound { program: String },

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// A task whose process has been spawned.
#[derive(Debug)]
pub struct SpawnedTask {
    spec: Arc<TaskSpec>,
    pid: Pid,
    pgid: Pid,
    started_at: f64,
    ended_at: Option<f64>,
    terminated_at: Option<f64>,
    killed_at: Option<f64>,
    returncode: Option<i32>,
    stdin: BufferedInput,
    statein: BufferedInput,
    stdout: ProgressiveOutput,
    stdout_bytes: Option<Vec<u8>>,
    stderr: BufferedOutput,
    stateout: BufferedOutput,
    state_path: PathBuf,
}

impl SpawnedTask {
    /// Spawn `spec`'s command, priming stdin with the task parameter and
    /// FD 3 with `state`.
    pub fn spawn(
        spec: Arc<TaskSpec>,
        state: Vec<u8>,
        state_path: PathBuf,
        clock: &dyn Clock,
    ) -> Result<Self, SpawnError> {
        let program = spec.exec.first().ok_or_else(|| SpawnError::NotFound {
            program: String::new(),
        })?;
        let executable = which(program).ok_or_else(|| SpawnError::NotFound {
            program: program.clone(),
        })?;

        // state pipes are close-on-exec: dup2 in the child clears the flag
        // on the well-known targets while the originals (and any sibling
        // task's pipes) vanish at exec
        let (statein_read, statein_write) = pipe_cloexec()?;
        let (stateout_read, stateout_write) = pipe_cloexec()?;

        let mut command = Command::new(executable);
        command
            .args(&spec.exec[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child_statein = statein_read.as_raw_fd();
        let child_stateout = stateout_write.as_raw_fd();
        // SAFETY: only async-signal-safe syscalls between fork and exec
        unsafe {
            command.pre_exec(move || {
                install_fd(child_statein, STATE_IN_FD)?;
                install_fd(child_stateout, STATE_OUT_FD)?;
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(io::Error::from)?;
                Ok(())
            });
        }

        let mut child = command.spawn()?;
        let pid = Pid::from_raw(child.id() as i32);

        // the parent's copies of the child-side ends close here
        drop(statein_read);
        drop(stateout_write);

        let child_stdin: OwnedFd = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("child stdin not piped"))?
            .into();
        let child_stdout: OwnedFd = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout not piped"))?
            .into();
        let child_stderr: OwnedFd = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("child stderr not piped"))?
            .into();

        let mut stdin = BufferedInput::new(child_stdin, spec.param.clone())?;
        let mut statein = BufferedInput::new(statein_write, state)?;
        stdin.send();
        statein.send();

        let stdout = ProgressiveOutput::new(child_stdout)?;
        let stderr = BufferedOutput::new(child_stderr)?;
        let stateout = BufferedOutput::new(stateout_read)?;

        Ok(Self {
            spec,
            pid,
            pgid: pid,
            started_at: clock.now(),
            ended_at: None,
            terminated_at: None,
            killed_at: None,
            returncode: None,
            stdin,
            statein,
            stdout,
            stdout_bytes: None,
            stderr,
            stateout,
            state_path,
        })
    }

    pub fn spec(&self) -> &Arc<TaskSpec> {
        &self.spec
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn pgid(&self) -> Pid {
        self.pgid
    }

    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<f64> {
        self.ended_at
    }

    /// When the SIGTERM escalation began, if it did.
    pub fn terminated_at(&self) -> Option<f64> {
        self.terminated_at
    }

    /// When SIGKILL was sent, if it was.
    pub fn killed_at(&self) -> Option<f64> {
        self.killed_at
    }

    /// The task's deadline, when a timeout is configured.
    pub fn expires_at(&self) -> Option<f64> {
        self.spec
            .timeout
            .map(|timeout| self.started_at + timeout.as_secs_f64())
    }

    /// Everything logged to stderr so far.
    pub fn stderr_bytes(&self) -> &[u8] {
        self.stderr.bytes()
    }

    /// The coalesced stdout, available once the task is ready.
    pub fn stdout_bytes(&self) -> Option<&[u8]> {
        self.stdout_bytes.as_deref()
    }

    pub fn returncode(&self) -> Option<i32> {
        self.returncode
    }

    /// Whether the deadline has passed.
    pub fn expired(&self, now: f64) -> bool {
        self.expires_at().map(|expires| now >= expires).unwrap_or(false)
    }

    /// Check the task process, delivering any due timeout signals and
    /// draining its pipes. Returns the exit code once the process has
    /// terminated; the first such observation finalizes the task record.
    pub fn poll(&mut self, clock: &dyn Clock) -> Option<i32> {
        if self.returncode.is_some() {
            return self.returncode;
        }

        let now = clock.now();
        if self.expired(now) {
            self.signal_expiry(now);
        }

        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => {
                self.stdin.send();
                self.statein.send();
                self.stderr.receive();
                self.stateout.receive();
                None
            }
            Ok(WaitStatus::Exited(_, code)) => Some(self.finish(code, now)),
            Ok(WaitStatus::Signaled(_, signal, _)) => Some(self.finish(-(signal as i32), now)),
            Ok(status) => {
                tracing::debug!(task = %self.spec.name, ?status, "ignored wait status");
                None
            }
            Err(errno) => {
                tracing::warn!(task = %self.spec.name, errno = %errno, "waitpid failed");
                None
            }
        }
    }

    /// Whether the task process has terminated (see [`Self::poll`]).
    pub fn ready(&mut self, clock: &dyn Clock) -> bool {
        self.poll(clock).is_some()
    }

    fn signal_expiry(&mut self, now: f64) {
        let signal = if self.terminated_at.is_none() {
            self.terminated_at = Some(now);
            tracing::debug!(task = %self.spec.name, "task expired; terminating");
            Signal::SIGTERM
        } else {
            if self.killed_at.is_none() {
                self.killed_at = Some(now);
                tracing::debug!(task = %self.spec.name, "task ignored termination; killing");
            }
            Signal::SIGKILL
        };

        // target the whole group while the child still leads it; a child
        // that moved itself is signalled alone
        let leads_group = nix::unistd::getpgid(Some(self.pid))
            .map(|pgid| pgid == self.pgid)
            .unwrap_or(false);
        let delivered = if leads_group {
            killpg(self.pgid, signal)
        } else {
            kill(self.pid, signal)
        };
        match delivered {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(errno) => {
                tracing::warn!(task = %self.spec.name, errno = %errno, signal = %signal, "timeout signal failed");
            }
        }
    }

    fn finish(&mut self, code: i32, now: f64) -> i32 {
        self.ended_at = Some(now);
        self.returncode = Some(code);

        // the pipes hold whatever remained at exit; drain to end-of-file
        self.stdin.send();
        self.statein.send();
        self.stderr.receive();
        self.stateout.receive();
        self.stdout_bytes = Some(self.stdout.close());
        self.stderr.close();
        self.stateout.close();

        if TaskOutcome::from_code(code).persists_state() {
            self.persist_state();
        }

        code
    }

    fn persist_state(&mut self) {
        let state = self.stateout.bytes();
        if state.is_empty() {
            return;
        }

        if let Some(format) = self.spec.state_format {
            let (_, errors) = fate_core::detect_extension(state, &[format]);
            if !errors.is_empty() {
                tracing::error!(
                    task = %self.spec.name,
                    format = %format,
                    error = %errors[0],
                    "task state violates its configured format; not persisted"
                );
                return;
            }
        }

        if let Err(err) = write_state(&self.state_path, state) {
            tracing::error!(
                task = %self.spec.name,
                path = %self.state_path.display(),
                error = %err,
                "task state could not be persisted"
            );
        }
    }

    /// Tear the record down into its completed parts. Call only once
    /// ready.
    pub fn into_parts(self) -> (Arc<TaskSpec>, Option<i32>, Vec<u8>, Vec<u8>) {
        let stdout = self.stdout_bytes.unwrap_or_default();
        let stderr = self.stderr.into_bytes();
        (self.spec, self.returncode, stdout, stderr)
    }
}

/// Atomic write via a temporary sibling.
fn write_state(path: &Path, state: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("state.tmp");
    std::fs::write(&tmp, state)?;
    std::fs::rename(&tmp, path)
}

fn pipe_cloexec() -> io::Result<(OwnedFd, OwnedFd)> {
    nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC).map_err(io::Error::from)
}

/// Duplicate `src` onto the well-known `dst`, clearing close-on-exec.
/// Runs between fork and exec.
fn install_fd(src: RawFd, dst: RawFd) -> io::Result<()> {
    if src == dst {
        // dup2 would be a no-op and leave close-on-exec set
        nix::fcntl::fcntl(dst, nix::fcntl::FcntlArg::F_SETFD(nix::fcntl::FdFlag::empty()))
            .map_err(io::Error::from)?;
        return Ok(());
    }
    nix::unistd::dup2(src, dst).map_err(io::Error::from)?;
    Ok(())
}

/// Resolve a program name on PATH, honoring explicit path components.
pub fn which(program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    if program.contains('/') {
        let path = PathBuf::from(program);
        return executable(&path).then_some(path);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| executable(candidate))
}

fn executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
