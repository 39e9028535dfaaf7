// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task result output: format detection and result-file naming.
//!
//! A completed task's stdout may be persisted to a result file. The file
//! extension comes either from probing the bytes (`auto`) or from validating
//! them against an explicitly configured format list.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Offset and magic of the POSIX tar header.
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8] = b"ustar";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/// Serialization tag for a task's result output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTag {
    /// Probe JSON, YAML, TOML, TAR, TAR.GZ in that order.
    Auto,
    Json,
    Yaml,
    Toml,
    Csv,
    Tar,
}

impl OutputTag {
    /// All recognized configuration names.
    pub const NAMES: &'static [&'static str] = &["auto", "json", "yaml", "toml", "csv", "tar"];
}

impl FromStr for OutputTag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(OutputTag::Auto),
            "json" => Ok(OutputTag::Json),
            "yaml" => Ok(OutputTag::Yaml),
            "toml" => Ok(OutputTag::Toml),
            "csv" => Ok(OutputTag::Csv),
            "tar" => Ok(OutputTag::Tar),
            _ => Err(()),
        }
    }
}

impl fmt::Display for OutputTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTag::Auto => write!(f, "auto"),
            OutputTag::Json => write!(f, "json"),
            OutputTag::Yaml => write!(f, "yaml"),
            OutputTag::Toml => write!(f, "toml"),
            OutputTag::Csv => write!(f, "csv"),
            OutputTag::Tar => write!(f, "tar"),
        }
    }
}

/// Stdout failed to validate against a configured output format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("output is not valid {format}: {message}")]
pub struct OutputDecodeError {
    pub format: OutputTag,
    pub message: String,
}

/// Determine the result-file extension for `stdout`.
///
/// Under `auto`, probing failures are not errors: the extension is simply
/// empty. Under an explicit tag list, each tag is validated in order; when
/// none accepts the bytes the collected decode errors are returned and the
/// caller writes the file without a suffix.
pub fn detect_extension(stdout: &[u8], tags: &[OutputTag]) -> (String, Vec<OutputDecodeError>) {
    if tags.is_empty() {
        return (String::new(), Vec::new());
    }

    if tags.contains(&OutputTag::Auto) {
        if stdout.is_empty() {
            return (String::new(), Vec::new());
        }
        for probe in [probe_json, probe_yaml, probe_toml, probe_tar, probe_tar_gz] {
            if let Ok(extension) = probe(stdout) {
                return (extension.to_string(), Vec::new());
            }
        }
        return (String::new(), Vec::new());
    }

    let mut errors = Vec::new();
    for tag in tags {
        match validate(stdout, *tag) {
            Ok(extension) => return (extension.to_string(), errors),
            Err(error) => errors.push(error),
        }
    }
    (String::new(), errors)
}

/// Path (without extension) of a result file written at `at`:
/// `<dir>/result-<unix-ts>-<YYYYMMDDTHHMMSS>-<task>`.
pub fn result_identifier(dir: &Path, task: &str, at: DateTime<Utc>) -> PathBuf {
    let stamp = at.timestamp();
    let datestr = at.format("%Y%m%dT%H%M%S");
    dir.join(format!("result-{stamp}-{datestr}-{task}"))
}

fn validate(stdout: &[u8], tag: OutputTag) -> Result<&'static str, OutputDecodeError> {
    match tag {
        OutputTag::Auto => unreachable!("auto handled by the caller"),
        OutputTag::Json => text(stdout, tag).and_then(|text| {
            probe_json(text.as_bytes()).map_err(|message| decode_error(tag, message))
        }),
        OutputTag::Yaml => text(stdout, tag).and_then(|text| {
            probe_yaml(text.as_bytes()).map_err(|message| decode_error(tag, message))
        }),
        OutputTag::Toml => text(stdout, tag).and_then(|text| {
            probe_toml(text.as_bytes()).map_err(|message| decode_error(tag, message))
        }),
        OutputTag::Csv => text(stdout, tag).and_then(|text| {
            probe_csv(text.as_bytes()).map_err(|message| decode_error(tag, message))
        }),
        OutputTag::Tar => probe_tar(stdout)
            .or_else(|_| probe_tar_gz(stdout))
            .map_err(|message| decode_error(tag, message)),
    }
}

fn text(stdout: &[u8], tag: OutputTag) -> Result<&str, OutputDecodeError> {
    std::str::from_utf8(stdout).map_err(|err| decode_error(tag, err.to_string()))
}

fn decode_error(format: OutputTag, message: String) -> OutputDecodeError {
    OutputDecodeError { format, message }
}

fn probe_json(stdout: &[u8]) -> Result<&'static str, String> {
    match serde_json::from_slice::<Value>(stdout) {
        Ok(value) if !value.is_string() => Ok(".json"),
        Ok(_) => Err("document is a bare string".into()),
        Err(err) => Err(err.to_string()),
    }
}

fn probe_yaml(stdout: &[u8]) -> Result<&'static str, String> {
    // yaml parses nearly any line as a scalar string document, which is
    // almost never what a structured result intends
    match serde_yaml::from_slice::<serde_yaml::Value>(stdout) {
        Ok(serde_yaml::Value::String(_)) => Err("document is a bare string".into()),
        Ok(_) => Ok(".yaml"),
        Err(err) => Err(err.to_string()),
    }
}

fn probe_toml(stdout: &[u8]) -> Result<&'static str, String> {
    let text = std::str::from_utf8(stdout).map_err(|err| err.to_string())?;
    match toml::from_str::<toml::Table>(text) {
        Ok(_) => Ok(".toml"),
        Err(err) => Err(err.to_string()),
    }
}

fn probe_csv(stdout: &[u8]) -> Result<&'static str, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(stdout);
    for row in reader.records() {
        row.map_err(|err| err.to_string())?;
    }
    Ok(".csv")
}

fn probe_tar(stdout: &[u8]) -> Result<&'static str, String> {
    if stdout.len() >= TAR_MAGIC_OFFSET + TAR_MAGIC.len()
        && &stdout[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()] == TAR_MAGIC
    {
        Ok(".tar")
    } else {
        Err("no tar header magic".into())
    }
}

fn probe_tar_gz(stdout: &[u8]) -> Result<&'static str, String> {
    if !stdout.starts_with(GZIP_MAGIC) {
        return Err("no gzip magic".into());
    }
    // only the first tar header block is needed
    let mut header = [0u8; 512];
    let mut decoder = flate2::read::GzDecoder::new(stdout);
    decoder
        .read_exact(&mut header)
        .map_err(|err| err.to_string())?;
    probe_tar(&header).map(|_| ".tar.gz")
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
