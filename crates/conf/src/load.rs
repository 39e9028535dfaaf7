// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration-set loading.
//!
//! A configuration set is a task file (`tasks.toml` or `tasks.yaml`, whose
//! top-level tables are the tasks, in declaration order) plus an optional
//! `defaults` file of shared `format`/`path` fallbacks. The realized
//! [`Conf`] carries the resolved specs and the file paths that identify the
//! set on disk.

use crate::error::ConfError;
use crate::path::PrefixPaths;
use crate::task::{Defaults, RawTask, TaskSpec};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

const TASK_STEMS: [&str; 2] = ["tasks.toml", "tasks.yaml"];
const DEFAULT_STEMS: [&str; 2] = ["defaults.toml", "defaults.yaml"];

/// A fully-realized configuration set.
#[derive(Debug, Clone)]
pub struct Conf {
    /// Tasks in declaration order, keyed by unique name.
    pub tasks: IndexMap<String, TaskSpec>,
    /// The configuration files this set was read from.
    pub paths: Vec<PathBuf>,
    /// Filesystem roots for this run.
    pub prefix: PrefixPaths,
}

impl Conf {
    /// Load the configuration set found in `dir`.
    pub fn load(dir: &Path, prefix: PrefixPaths) -> Result<Self, ConfError> {
        let task_path = find_one(dir, &TASK_STEMS)?.ok_or_else(|| ConfError::Missing {
            dir: dir.to_path_buf(),
        })?;
        let defaults_path = find_one(dir, &DEFAULT_STEMS)?;

        let raw_tasks: IndexMap<String, RawTask> = read_document(&task_path)?;
        let defaults: Defaults = match &defaults_path {
            Some(path) => read_document(path)?,
            None => Defaults::default(),
        };

        let mut tasks = IndexMap::with_capacity(raw_tasks.len());
        for (name, raw) in raw_tasks {
            let spec = TaskSpec::build(&name, raw, &defaults)?;
            tasks.insert(name, spec);
        }

        let mut paths = vec![task_path];
        paths.extend(defaults_path);

        Ok(Conf {
            tasks,
            paths,
            prefix,
        })
    }

    /// Build a set directly from resolved specs (tests, embedders).
    pub fn from_specs(
        specs: impl IntoIterator<Item = TaskSpec>,
        paths: Vec<PathBuf>,
        prefix: PrefixPaths,
    ) -> Self {
        Conf {
            tasks: specs.into_iter().map(|spec| (spec.name.clone(), spec)).collect(),
            paths,
            prefix,
        }
    }
}

/// Locate exactly one of the candidate file names in `dir`.
fn find_one(dir: &Path, names: &[&str]) -> Result<Option<PathBuf>, ConfError> {
    let present: Vec<PathBuf> = names
        .iter()
        .map(|name| dir.join(name))
        .filter(|path| path.is_file())
        .collect();

    match present.len() {
        0 => Ok(None),
        1 => Ok(present.into_iter().next()),
        _ => Err(ConfError::Conflict { paths: present }),
    }
}

fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfError> {
    let text = std::fs::read_to_string(path).map_err(|err| ConfError::Syntax {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    let is_yaml = path
        .extension()
        .map(|ext| ext == "yaml" || ext == "yml")
        .unwrap_or(false);

    if is_yaml {
        serde_yaml::from_str(&text).map_err(|err| ConfError::Syntax {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    } else {
        toml::from_str(&text).map_err(|err| ConfError::Syntax {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "load_tests.rs"]
mod tests;
