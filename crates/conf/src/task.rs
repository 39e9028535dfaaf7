// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task specifications.
//!
//! A [`TaskSpec`] is the immutable, fully-resolved view of one configured
//! task: argv, stdin parameter bytes, timeout, tenancy ceiling, schedule,
//! guards, and the format/path settings governing its streams. Raw
//! declarations carry the layered shorthands (`exec` vs `command` vs
//! `shell`, structured params, duration strings); resolution flattens them
//! here, once, at load time.

use crate::error::ConfError;
use crate::guard::Guard;
use crate::schedule::Schedule;
use crate::LIB_NAME;
use fate_core::{LogFormat, OutputTag};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Immutable view of one configured task.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Unique task name (the configuration table key).
    pub name: String,
    /// Program and arguments.
    pub exec: Vec<String>,
    /// Bytes piped to the task's stdin.
    pub param: Vec<u8>,
    /// Wall-clock budget before the task's process group is signalled.
    pub timeout: Option<Duration>,
    /// Maximum concurrently running instances of this task name.
    /// `None` is unbounded.
    pub tenancy: Option<u32>,
    /// When the task fires. Tasks without a schedule only run on demand.
    pub schedule: Option<Schedule>,
    /// if/unless predicates consulted at fire time.
    pub guard: Guard,
    /// Encoding of the task's stderr log records.
    pub log_format: LogFormat,
    /// Serialization tags tried against the task's stdout.
    pub result_format: Vec<OutputTag>,
    /// Directory to write result files into, when enabled.
    pub result_path: Option<PathBuf>,
    /// Strict format for state bytes, when configured.
    pub state_format: Option<OutputTag>,
}

/// `shell` shorthand: a command line for `/bin/sh`, or an explicit
/// interpreter with a script.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ShellSpec {
    Command(String),
    Script { executable: String, script: String },
}

/// `param` value: literal text, or a document serialized per
/// `format.param`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParamSpec {
    Text(String),
    Data(serde_json::Value),
}

/// `timeout` value: seconds, or a duration string such as `"90s"`/`"5m"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimeoutSpec {
    Seconds(f64),
    Text(String),
}

/// `format.result` value: one tag or an ordered list of candidates.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResultFormatSpec {
    One(String),
    Many(Vec<String>),
}

/// Raw `format` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatSpec {
    pub log: Option<String>,
    pub param: Option<String>,
    pub result: Option<ResultFormatSpec>,
    pub state: Option<String>,
}

/// Raw `path` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathSpec {
    pub result: Option<PathBuf>,
}

/// Raw `scheduling` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulingSpec {
    pub tenancy: Option<u32>,
}

/// One task declaration as read from the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTask {
    pub exec: Option<Vec<String>>,
    pub command: Option<String>,
    pub shell: Option<ShellSpec>,
    pub param: Option<ParamSpec>,
    pub timeout: Option<TimeoutSpec>,
    pub schedule: Option<String>,
    pub scheduling: Option<SchedulingSpec>,
    #[serde(rename = "if")]
    pub if_expr: Option<String>,
    #[serde(rename = "unless")]
    pub unless_expr: Option<String>,
    pub format: Option<FormatSpec>,
    pub path: Option<PathSpec>,
}

/// Fallbacks shared by every task (the `defaults` file).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Defaults {
    pub format: Option<FormatSpec>,
    pub path: Option<PathSpec>,
}

impl TaskSpec {
    /// Resolve a raw declaration against the shared defaults.
    pub fn build(name: &str, raw: RawTask, defaults: &Defaults) -> Result<Self, ConfError> {
        let exec = resolve_exec(name, &raw)?;
        let param = resolve_param(name, raw.param, &raw.format, defaults)?;
        let timeout = raw.timeout.map(|spec| resolve_timeout(name, spec)).transpose()?;
        let tenancy = raw
            .scheduling
            .and_then(|scheduling| scheduling.tenancy)
            .filter(|ceiling| *ceiling > 0);
        let schedule = raw
            .schedule
            .as_deref()
            .map(|expr| {
                Schedule::parse(expr, name)
                    .map_err(|err| ConfError::Value(format!("{name}.schedule: {err}")))
            })
            .transpose()?;

        let log_format = lookup(&raw.format, defaults, |format| format.log.clone())
            .map(|value| {
                value.parse::<LogFormat>().map_err(|()| {
                    ConfError::Value(format!(
                        "{name}.format.log: unsupported log format: {value:?} (select from: {})",
                        LogFormat::NAMES.join(", "),
                    ))
                })
            })
            .transpose()?
            .unwrap_or_default();

        let result_format = lookup(&raw.format, defaults, |format| format.result.clone())
            .map(|value| resolve_result_format(name, value))
            .transpose()?
            .unwrap_or_else(|| vec![OutputTag::Auto]);

        let state_format = lookup(&raw.format, defaults, |format| format.state.clone())
            .map(|value| {
                value.parse::<OutputTag>().map_err(|()| {
                    ConfError::Value(format!(
                        "{name}.format.state: unsupported serialization format: {value:?} \
                         (select from: {})",
                        OutputTag::NAMES.join(", "),
                    ))
                })
            })
            .transpose()?;

        let result_path = raw
            .path
            .as_ref()
            .and_then(|path| path.result.clone())
            .or_else(|| defaults.path.as_ref().and_then(|path| path.result.clone()));

        Ok(TaskSpec {
            name: name.to_string(),
            exec,
            param,
            timeout,
            tenancy,
            schedule,
            guard: Guard {
                if_expr: raw.if_expr,
                unless_expr: raw.unless_expr,
            },
            log_format,
            result_format,
            result_path,
            state_format,
        })
    }

    /// Whether the schedule fires in `(prev, now]`.
    pub fn scheduled(&self, prev: f64, now: f64) -> bool {
        self.schedule
            .as_ref()
            .map(|schedule| schedule.scheduled(prev, now))
            .unwrap_or(false)
    }

    /// Next fire instant strictly after `t`, within a year.
    pub fn next_after(&self, t: f64) -> Option<f64> {
        self.schedule.as_ref().and_then(|schedule| schedule.next_after(t))
    }
}

fn resolve_exec(name: &str, raw: &RawTask) -> Result<Vec<String>, ConfError> {
    let configured = [
        raw.exec.is_some(),
        raw.command.is_some(),
        raw.shell.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();
    if configured > 1 {
        return Err(ConfError::Type(format!(
            "{name}: ambiguous configuration: specify one of task 'exec', 'command' or 'shell'"
        )));
    }

    if let Some(exec) = &raw.exec {
        if exec.is_empty() {
            return Err(ConfError::Value(format!("{name}.exec: empty argument vector")));
        }
        return Ok(exec.clone());
    }

    if let Some(shell) = &raw.shell {
        return Ok(match shell {
            ShellSpec::Command(line) => {
                vec!["/bin/sh".to_string(), "-c".to_string(), line.clone()]
            }
            ShellSpec::Script { executable, script } => {
                vec![executable.clone(), "-c".to_string(), script.clone()]
            }
        });
    }

    // bare tasks invoke a library-prefixed command named for the task
    let command = raw.command.as_deref().unwrap_or(name);
    Ok(vec![format!("{LIB_NAME}-{command}")])
}

fn resolve_param(
    name: &str,
    param: Option<ParamSpec>,
    format: &Option<FormatSpec>,
    defaults: &Defaults,
) -> Result<Vec<u8>, ConfError> {
    let Some(param) = param else {
        return Ok(Vec::new());
    };

    match param {
        ParamSpec::Text(text) => Ok(text.into_bytes()),
        ParamSpec::Data(value) => {
            let tag = lookup(format, defaults, |format| format.param.clone())
                .unwrap_or_else(|| "json".to_string());
            match tag.as_str() {
                "json" => serde_json::to_vec(&value)
                    .map_err(|err| ConfError::Value(format!("{name}.param: {err}"))),
                "yaml" => serde_yaml::to_string(&value)
                    .map(String::into_bytes)
                    .map_err(|err| ConfError::Value(format!("{name}.param: {err}"))),
                "toml" => toml::to_string(&value)
                    .map(String::into_bytes)
                    .map_err(|err| ConfError::Value(format!("{name}.param: {err}"))),
                other => Err(ConfError::Value(format!(
                    "{name}.format.param: unsupported serialization format: {other:?} \
                     (select from: json, toml, yaml)"
                ))),
            }
        }
    }
}

fn resolve_timeout(name: &str, spec: TimeoutSpec) -> Result<Duration, ConfError> {
    match spec {
        TimeoutSpec::Seconds(seconds) if seconds >= 0.0 => Ok(Duration::from_secs_f64(seconds)),
        TimeoutSpec::Seconds(seconds) => Err(ConfError::Value(format!(
            "{name}.timeout: negative duration {seconds}"
        ))),
        TimeoutSpec::Text(text) => parse_duration(&text)
            .map_err(|message| ConfError::Value(format!("{name}.timeout: {message}"))),
    }
}

fn resolve_result_format(name: &str, spec: ResultFormatSpec) -> Result<Vec<OutputTag>, ConfError> {
    let names = match spec {
        ResultFormatSpec::One(tag) => vec![tag],
        ResultFormatSpec::Many(tags) => tags,
    };
    names
        .into_iter()
        .map(|value| {
            value.parse::<OutputTag>().map_err(|()| {
                ConfError::Value(format!(
                    "{name}.format.result: unsupported serialization format: {value:?} \
                     (select from: {})",
                    OutputTag::NAMES.join(", "),
                ))
            })
        })
        .collect()
}

fn lookup<T>(
    format: &Option<FormatSpec>,
    defaults: &Defaults,
    key: impl Fn(&FormatSpec) -> Option<T>,
) -> Option<T> {
    format
        .as_ref()
        .and_then(&key)
        .or_else(|| defaults.format.as_ref().and_then(&key))
}

/// Parse a duration string like `"500ms"`, `"30s"`, `"5m"`, `"1h"`, or a
/// bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (num_str, suffix) = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, _)| (&s[..i], &s[i..]))
        .unwrap_or((s, ""));

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("invalid number in duration: {s}"))?;

    let multiplier = match suffix.trim() {
        "ms" | "millis" | "millisecond" | "milliseconds" => {
            return Ok(Duration::from_secs_f64(num / 1000.0));
        }
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
        "d" | "day" | "days" => 86400.0,
        other => return Err(format!("unknown duration suffix: {other}")),
    };

    Ok(Duration::from_secs_f64(num * multiplier))
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
