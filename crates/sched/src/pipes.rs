// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Non-blocking byte carriers over OS pipes.
//!
//! The execution loop owns every reader and writer here and drives them
//! from its single thread; the one exception is [`ProgressiveOutput`],
//! whose dedicated drain thread keeps a high-volume stdout pipe from ever
//! filling while the loop is busy elsewhere.

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use parking_lot::Mutex;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Read size for output drains.
const READ_CHUNK: usize = 64 * 1024;

/// Default write chunk for buffered inputs.
pub const WRITE_CHUNK: usize = 8 * 1024;

/// Pause between reads on the progressive drain thread.
const DRAIN_PAUSE: Duration = Duration::from_micros(500);

/// Mark a descriptor non-blocking.
pub fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL).map_err(io::Error::from)?;
    let flags = OFlag::from_bits_retain(flags) | OFlag::O_NONBLOCK;
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;
    Ok(())
}

/// Non-blocking reader accumulating into an in-memory buffer.
#[derive(Debug)]
pub struct BufferedOutput {
    fd: Option<OwnedFd>,
    buffer: Vec<u8>,
}

impl BufferedOutput {
    /// Wrap a descriptor, marking it non-blocking.
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(&fd)?;
        Ok(Self {
            fd: Some(fd),
            buffer: Vec::new(),
        })
    }

    /// Append whatever is ready. Reaching end-of-file releases the
    /// descriptor.
    pub fn receive(&mut self) {
        let Some(fd) = &self.fd else { return };
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match nix::unistd::read(fd.as_raw_fd(), &mut chunk) {
                Ok(0) => {
                    self.fd = None;
                    return;
                }
                Ok(count) => self.buffer.extend_from_slice(&chunk[..count]),
                Err(Errno::EAGAIN) => return,
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    tracing::warn!(errno = %errno, "output pipe read failed");
                    self.fd = None;
                    return;
                }
            }
        }
    }

    /// Release the descriptor, keeping the buffer.
    pub fn close(&mut self) {
        self.fd = None;
    }

    pub fn closed(&self) -> bool {
        self.fd.is_none()
    }

    /// Everything received so far.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the accumulated buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

#[derive(Debug, Default)]
struct DrainShared {
    stop: AtomicBool,
    chunks: Mutex<Vec<Vec<u8>>>,
}

/// High-throughput reader drained by a dedicated thread.
///
/// The thread reads in a tight loop with a micro-sleep and appends chunks
/// to a shared list; `close` joins the thread and coalesces the chunks.
/// The loop thread only reads the aggregate after the join, so the chunk
/// list needs no further coordination.
#[derive(Debug)]
pub struct ProgressiveOutput {
    shared: Arc<DrainShared>,
    worker: Option<JoinHandle<()>>,
}

impl ProgressiveOutput {
    /// Wrap a descriptor and start its drain thread.
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(&fd)?;
        let shared = Arc::new(DrainShared::default());
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("stdout-drain".to_string())
            .spawn(move || drain(fd, &worker_shared))?;
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Stop the drain thread and coalesce everything it read.
    ///
    /// Idempotent: later calls return an empty buffer.
    pub fn close(&mut self) -> Vec<u8> {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("stdout drain thread panicked");
            }
        }
        let mut chunks = self.shared.chunks.lock();
        let total = chunks.iter().map(Vec::len).sum();
        let mut buffer = Vec::with_capacity(total);
        for chunk in chunks.drain(..) {
            buffer.extend_from_slice(&chunk);
        }
        buffer
    }

    pub fn closed(&self) -> bool {
        self.worker.is_none()
    }
}

impl Drop for ProgressiveOutput {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.close();
        }
    }
}

fn drain(fd: OwnedFd, shared: &DrainShared) {
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match nix::unistd::read(fd.as_raw_fd(), &mut chunk) {
            Ok(0) => return,
            Ok(count) => shared.chunks.lock().push(chunk[..count].to_vec()),
            Err(Errno::EAGAIN) => {
                if shared.stop.load(Ordering::Acquire) {
                    return;
                }
                std::thread::sleep(DRAIN_PAUSE);
            }
            Err(Errno::EINTR) => continue,
            Err(errno) => {
                tracing::warn!(errno = %errno, "stdout pipe read failed");
                return;
            }
        }
    }
}

/// Non-blocking writer advancing through fixed data in chunks.
#[derive(Debug)]
pub struct BufferedInput {
    fd: Option<OwnedFd>,
    data: Vec<u8>,
    sent: usize,
    chunk: usize,
}

impl BufferedInput {
    /// Wrap a descriptor, marking it non-blocking.
    pub fn new(fd: OwnedFd, data: Vec<u8>) -> io::Result<Self> {
        set_nonblocking(&fd)?;
        Ok(Self {
            fd: Some(fd),
            data,
            sent: 0,
            chunk: WRITE_CHUNK,
        })
    }

    /// Write as much as the pipe will take. Closes the descriptor on
    /// completion (delivering end-of-file) and is a no-op afterwards. A
    /// receiver that has gone away is not an error; the remainder is
    /// dropped.
    pub fn send(&mut self) {
        let Some(fd) = &self.fd else { return };
        while self.sent < self.data.len() {
            let end = (self.sent + self.chunk).min(self.data.len());
            match nix::unistd::write(fd, &self.data[self.sent..end]) {
                Ok(count) => self.sent += count,
                Err(Errno::EAGAIN) => return,
                Err(Errno::EINTR) => continue,
                Err(Errno::EPIPE) => break,
                Err(errno) => {
                    tracing::warn!(errno = %errno, "input pipe write failed");
                    break;
                }
            }
        }
        self.fd = None;
    }

    /// Whether all data was written (or the receiver went away).
    pub fn done(&self) -> bool {
        self.fd.is_none()
    }

    /// Bytes written so far.
    pub fn sent(&self) -> usize {
        self.sent
    }
}

#[cfg(test)]
#[path = "pipes_tests.rs"]
mod tests;
