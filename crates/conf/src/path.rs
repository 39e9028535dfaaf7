// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem prefixes for configuration, result data, and state.
//!
//! Injected explicitly at construction; nothing here is a process-wide
//! singleton.

use std::path::{Path, PathBuf};

/// The three filesystem roots a run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixPaths {
    /// Task configuration files.
    pub conf: PathBuf,
    /// Default directory for result files.
    pub data: PathBuf,
    /// Check markers and task state blobs.
    pub state: PathBuf,
}

impl PrefixPaths {
    /// Determine prefixes appropriate to the environment: XDG base
    /// directories for a user install, the conventional system directories
    /// otherwise.
    pub fn discover() -> Self {
        if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
            Self {
                conf: env_path("XDG_CONFIG_HOME").unwrap_or_else(|| home.join(".config")),
                data: env_path("XDG_DATA_HOME")
                    .unwrap_or_else(|| home.join(".local").join("share")),
                state: env_path("XDG_STATE_HOME")
                    .unwrap_or_else(|| home.join(".local").join("state")),
            }
        } else {
            Self {
                conf: PathBuf::from("/etc"),
                data: PathBuf::from("/var/log"),
                state: PathBuf::from("/var/lib"),
            }
        }
    }

    /// All three prefixes under a single root. Used by tests and one-off
    /// sandboxed runs.
    pub fn under(root: &Path) -> Self {
        Self {
            conf: root.to_path_buf(),
            data: root.to_path_buf(),
            state: root.to_path_buf(),
        }
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
