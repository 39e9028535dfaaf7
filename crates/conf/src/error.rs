// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration error taxonomy.
//!
//! Configuration errors abort a run before the scheduler starts; each maps
//! to a sysexits-style exit code at the CLI.

use std::path::PathBuf;
use thiserror::Error;

/// A configuration set could not be realized.
#[derive(Debug, Error)]
pub enum ConfError {
    /// More than one task file claims the same configuration slot.
    #[error("conflicting configuration files: {}", join_paths(paths))]
    Conflict { paths: Vec<PathBuf> },

    /// A configuration file failed to parse.
    #[error("configuration syntax error in {}: {message}", path.display())]
    Syntax { path: PathBuf, message: String },

    /// No task configuration file was found.
    #[error("no task configuration found under {}", dir.display())]
    Missing { dir: PathBuf },

    /// Structurally invalid configuration (mutually exclusive keys, wrong
    /// shapes).
    #[error("{0}")]
    Type(String),

    /// A key holds an unsupported or out-of-range value.
    #[error("{0}")]
    Value(String),
}

impl ConfError {
    /// sysexits-style exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfError::Conflict { .. } => 64,
            ConfError::Syntax { .. } => 65,
            ConfError::Missing { .. } => 72,
            ConfError::Type(_) | ConfError::Value(_) => 78,
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A guard expression could not be parsed.
///
/// Deferred to evaluation time: the scheduler logs a warning and falls back
/// to `evaluation` (the task is skipped) rather than aborting the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {key} expression: {message}")]
pub struct ConfBracketError {
    /// Configuration key holding the expression (`if` or `unless`).
    pub key: &'static str,
    pub message: String,
    /// Value to schedule with when the expression cannot be evaluated.
    pub evaluation: bool,
}
