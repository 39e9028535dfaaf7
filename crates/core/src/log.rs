// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task log records.
//!
//! A task logs to stderr as a stream of NUL-delimited records. Each record
//! is one encoded object (or a plain line, under the `auto`/`mixed`
//! formats). Decoding is strict only for explicitly configured formats, and
//! failures are deferred to whoever materializes the record.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separator between log records on a task's stderr stream.
pub const RECORD_SEPARATOR: u8 = 0;

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Map a syslog priority (0-7) onto a level.
    pub fn from_syslog(priority: u8) -> Self {
        match priority {
            0 | 1 => LogLevel::Critical,
            2 => LogLevel::Error,
            3 => LogLevel::Warning,
            4 | 5 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" | "FATAL" => Ok(LogLevel::Critical),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Encoding configured for a task's stderr records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Try JSON per record; fall back to plain text.
    #[default]
    Auto,
    /// Alias of `Auto` kept distinct for reporting.
    Mixed,
    Json,
    Yaml,
    Toml,
    Csv,
}

impl LogFormat {
    /// All recognized configuration names.
    pub const NAMES: &'static [&'static str] = &["auto", "mixed", "json", "yaml", "toml", "csv"];
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(LogFormat::Auto),
            "mixed" => Ok(LogFormat::Mixed),
            "json" => Ok(LogFormat::Json),
            "yaml" => Ok(LogFormat::Yaml),
            "toml" => Ok(LogFormat::Toml),
            "csv" => Ok(LogFormat::Csv),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Auto => write!(f, "auto"),
            LogFormat::Mixed => write!(f, "mixed"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Yaml => write!(f, "yaml"),
            LogFormat::Toml => write!(f, "toml"),
            LogFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Decoded payload of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordBody {
    /// Plain line (`auto`/`mixed` fallback).
    Text(String),
    /// Structured document, normalized to a JSON value.
    Data(Value),
}

/// One decoded stderr record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub task: String,
    pub level: LogLevel,
    pub body: RecordBody,
}

/// A single record failed to decode under its configured format.
#[derive(Debug, Error)]
pub enum LogRecordDecodeError {
    #[error("log record is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("log record is not valid {format}: {message}")]
    Decode { format: LogFormat, message: String },
}

/// An entire stderr stream contained undecodable records.
///
/// The records that did decode are retained alongside the failures.
#[derive(Debug, Error)]
#[error("{failed} of {total} log records failed to decode", failed = .errors.len(), total = .errors.len() + .records.len())]
pub struct LogsDecodingError {
    pub errors: Vec<LogRecordDecodeError>,
    pub records: Vec<LogRecord>,
}

impl LogRecord {
    /// Decode a single record.
    ///
    /// A leading `<N> ` prefix (N in 0-7) is a syslog priority and sets the
    /// level. Otherwise the level defaults to INFO, promoted by a top-level
    /// `level` key in a structured record.
    pub fn parse(
        message: &[u8],
        format: LogFormat,
        task: &str,
    ) -> Result<Self, LogRecordDecodeError> {
        let text = std::str::from_utf8(message)?;
        let (priority, text) = strip_syslog_prefix(text);

        let body = match format {
            LogFormat::Auto | LogFormat::Mixed => match serde_json::from_str::<Value>(text) {
                Ok(value) if !value.is_string() => RecordBody::Data(value),
                _ => RecordBody::Text(text.to_string()),
            },
            LogFormat::Json => RecordBody::Data(
                serde_json::from_str(text).map_err(|err| decode_error(format, err))?,
            ),
            LogFormat::Yaml => {
                let value: serde_yaml::Value =
                    serde_yaml::from_str(text).map_err(|err| decode_error(format, err))?;
                RecordBody::Data(
                    serde_json::to_value(value).map_err(|err| decode_error(format, err))?,
                )
            }
            LogFormat::Toml => {
                let value: toml::Value =
                    toml::from_str(text).map_err(|err| decode_error(format, err))?;
                RecordBody::Data(
                    serde_json::to_value(value).map_err(|err| decode_error(format, err))?,
                )
            }
            LogFormat::Csv => {
                let mut reader = csv::ReaderBuilder::new()
                    .has_headers(false)
                    .from_reader(text.as_bytes());
                let mut rows = Vec::new();
                for row in reader.records() {
                    let row = row.map_err(|err| decode_error(format, err))?;
                    rows.push(Value::Array(
                        row.iter().map(|field| Value::String(field.to_string())).collect(),
                    ));
                }
                RecordBody::Data(Value::Array(rows))
            }
        };

        let level = match priority {
            Some(priority) => LogLevel::from_syslog(priority),
            None => promoted_level(&body).unwrap_or(LogLevel::Info),
        };

        Ok(LogRecord {
            task: task.to_string(),
            level,
            body,
        })
    }

    /// Decode every record in a stderr stream.
    ///
    /// A trailing separator does not produce an empty record. When any
    /// record fails, the aggregate error carries both the failures and the
    /// records that did decode.
    pub fn parse_stream(
        stderr: &[u8],
        format: LogFormat,
        task: &str,
    ) -> Result<Vec<LogRecord>, LogsDecodingError> {
        let mut records = Vec::new();
        let mut errors = Vec::new();

        for segment in stderr.split(|byte| *byte == RECORD_SEPARATOR) {
            if segment.is_empty() {
                continue;
            }
            match Self::parse(segment, format, task) {
                Ok(record) => records.push(record),
                Err(error) => errors.push(error),
            }
        }

        if errors.is_empty() {
            Ok(records)
        } else {
            Err(LogsDecodingError { errors, records })
        }
    }
}

/// Complete (separator-terminated) raw records in `buf` from `offset` on.
///
/// Returns the records and the offset just past the last separator consumed,
/// for incremental scanning of a growing buffer.
pub fn complete_records(buf: &[u8], offset: usize) -> (Vec<Vec<u8>>, usize) {
    let mut records = Vec::new();
    let mut start = offset;

    while let Some(found) = buf[start..].iter().position(|byte| *byte == RECORD_SEPARATOR) {
        let end = start + found;
        if end > start {
            records.push(buf[start..end].to_vec());
        }
        start = end + 1;
    }

    (records, start)
}

fn strip_syslog_prefix(text: &str) -> (Option<u8>, &str) {
    let mut chars = text.chars();
    if let (Some('<'), Some(digit), Some('>'), Some(' ')) =
        (chars.next(), chars.next(), chars.next(), chars.next())
    {
        if let Some(priority) = digit.to_digit(10) {
            if priority <= 7 {
                return (Some(priority as u8), &text[4..]);
            }
        }
    }
    (None, text)
}

fn promoted_level(body: &RecordBody) -> Option<LogLevel> {
    if let RecordBody::Data(Value::Object(map)) = body {
        if let Some(Value::String(name)) = map.get("level") {
            return name.parse().ok();
        }
    }
    None
}

fn decode_error(format: LogFormat, err: impl fmt::Display) -> LogRecordDecodeError {
    LogRecordDecodeError::Decode {
        format,
        message: err.to_string(),
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
