// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-configuration-set state directories.
//!
//! Each distinct set of configuration file paths gets its own directory
//! under the state prefix, named `<tag>-<md5hex>` where the hex digests the
//! sorted paths and the tag is a friendly animal name derived from the same
//! digest. Only the hash identifies a directory; tags are ephemeral aides
//! and a directory found under a stale tag is renamed in place.
//!
//! The directory holds the zero-byte `check` marker (whose mtime is the
//! time of the last check), one `<task>.state` blob per task that has
//! persisted state, and a `conf/` subdirectory of symlinks back to the
//! live configuration files as a debugging aid.

use std::fs::{self, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

/// Friendly tags, indexed by config-set digest. Collisions are fine; the
/// hash component is authoritative.
const ANIMALS: [&str; 48] = [
    "ant", "badger", "bat", "bear", "bee", "bison", "camel", "carp", "cicada", "crane", "crow",
    "deer", "dingo", "donkey", "eagle", "eel", "falcon", "ferret", "fox", "gecko", "gibbon",
    "goat", "goose", "hare", "heron", "hornet", "ibis", "jackal", "jellyfish", "koala", "lemur",
    "lynx", "marmot", "mole", "moose", "newt", "otter", "owl", "panda", "quail", "raven",
    "salmon", "seal", "shrew", "stork", "tapir", "walrus", "wren",
];

/// On-disk state dedicated to one configuration set.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Open (creating or migrating as needed) the state directory for the
    /// configuration set identified by `conf_paths`, under `state_prefix`.
    pub fn open(state_prefix: &Path, conf_paths: &[PathBuf]) -> io::Result<Self> {
        let mut signature: Vec<String> = conf_paths
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        signature.sort();
        let digest = md5::compute(signature.join(":").as_bytes());
        let hash = format!("{digest:x}");
        let tag = ANIMALS[(u128::from_be_bytes(digest.0) % ANIMALS.len() as u128) as usize];

        let root = state_prefix.join(format!("{tag}-{hash}"));

        if !root.exists() {
            match find_stale(state_prefix, &hash)? {
                Some((stale, extras)) => {
                    tracing::debug!(stale = %stale.display(), "migrating stale state directory");
                    fs::rename(&stale, &root)?;
                    if !extras.is_empty() {
                        tracing::warn!(
                            stale = ?extras,
                            "ignoring additional stale state directories"
                        );
                    }
                }
                None => {
                    let conf_dir = root.join("conf");
                    fs::create_dir_all(&conf_dir)?;
                    for conf_path in conf_paths {
                        if let Some(name) = conf_path.file_name() {
                            let link = conf_dir.join(name);
                            if !link.exists() {
                                std::os::unix::fs::symlink(conf_path, link)?;
                            }
                        }
                    }
                }
            }
        }

        Ok(Self { root })
    }

    /// The directory itself.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// The zero-byte file whose mtime records the last check.
    pub fn check_path(&self) -> PathBuf {
        self.root.join("check")
    }

    /// Time of the last check, or `None` before the first run.
    pub fn read_last_check(&self) -> io::Result<Option<f64>> {
        match fs::metadata(self.check_path()) {
            Ok(meta) => {
                let mtime = meta
                    .modified()?
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_secs_f64())
                    .unwrap_or(0.0);
                Ok(Some(mtime))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Record `t` as the time of the last check.
    pub fn write_check(&self, t: f64) -> io::Result<()> {
        let path = self.check_path();
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        let stamp = UNIX_EPOCH + Duration::from_secs_f64(t.max(0.0));
        file.set_times(FileTimes::new().set_accessed(stamp).set_modified(stamp))
    }

    /// Path of a task's persisted state blob.
    pub fn task_state_path(&self, task: &str) -> PathBuf {
        self.root.join(format!("{task}.state"))
    }

    /// A task's persisted state; empty before the task first writes any.
    pub fn read_task_state(&self, task: &str) -> io::Result<Vec<u8>> {
        match fs::read(self.task_state_path(task)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    /// Persist a task's state atomically (write to `.tmp`, then rename).
    pub fn write_task_state(&self, task: &str, state: &[u8]) -> io::Result<()> {
        let path = self.task_state_path(task);
        let tmp = path.with_extension("state.tmp");
        fs::write(&tmp, state)?;
        fs::rename(&tmp, &path)
    }
}

/// A sibling directory whose trailing `-<hash>` matches, plus any extras.
fn find_stale(
    state_prefix: &Path,
    hash: &str,
) -> io::Result<Option<(PathBuf, Vec<PathBuf>)>> {
    let entries = match fs::read_dir(state_prefix) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(state_prefix)?;
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    let mut matches = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.rsplit('-').next() == Some(hash) {
            matches.push(entry.path());
        }
    }

    matches.sort();
    let mut matches = matches.into_iter();
    Ok(matches.next().map(|first| (first, matches.collect())))
}

#[cfg(test)]
#[path = "state_dir_tests.rs"]
mod tests;
