// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron-style schedule expressions.
//!
//! Tasks use the conventional five-field form (minute, hour, day-of-month,
//! month, day-of-week). `H` tokens hash deterministically to a stable slot
//! per task name, so a task keeps the same offset across runs while a fleet
//! of tasks spreads out instead of stampeding at minute zero.

use chrono::{DateTime, TimeZone, Utc};
use std::str::FromStr;
use thiserror::Error;

/// Window beyond which the next fire time is not searched (one year).
pub const NEXT_MAX_SECONDS: f64 = 60.0 * 60.0 * 24.0 * 365.0;

/// Inclusive value ranges of the five cron fields.
const FIELD_RANGES: [(u64, u64); 5] = [(0, 59), (0, 23), (1, 31), (1, 12), (1, 7)];

/// A parsed schedule expression.
#[derive(Debug, Clone)]
pub struct Schedule {
    source: String,
    inner: cron::Schedule,
}

/// A schedule expression could not be parsed.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid schedule expression {expr:?}: expected 5 fields, found {found}")]
    FieldCount { expr: String, found: usize },

    #[error("invalid schedule expression {expr:?}: unsupported hash token {token:?}")]
    HashToken { expr: String, token: String },

    #[error("invalid schedule expression {expr:?}: {message}")]
    Parse { expr: String, message: String },
}

impl Schedule {
    /// Parse a five-field expression, resolving `H` tokens against
    /// `slot_key` (the task name).
    pub fn parse(expr: &str, slot_key: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount {
                expr: expr.to_string(),
                found: fields.len(),
            });
        }

        let slot = hash_slot(slot_key);
        let mut expanded = Vec::with_capacity(5);
        for (field, (lo, hi)) in fields.iter().zip(FIELD_RANGES) {
            expanded.push(expand_field(field, lo, hi, slot).map_err(|token| {
                ScheduleError::HashToken {
                    expr: expr.to_string(),
                    token,
                }
            })?);
        }

        // the cron crate wants seconds up front and accepts a year field
        let full = format!("0 {} *", expanded.join(" "));
        let inner = cron::Schedule::from_str(&full).map_err(|err| ScheduleError::Parse {
            expr: expr.to_string(),
            message: err.to_string(),
        })?;

        Ok(Self {
            source: expr.to_string(),
            inner,
        })
    }

    /// The expression as configured.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the expression fires at some instant in `(prev, now]`
    /// (epoch seconds).
    pub fn scheduled(&self, prev: f64, now: f64) -> bool {
        self.first_after(prev)
            .map(|fire| fire <= now)
            .unwrap_or(false)
    }

    /// The smallest fire instant strictly after `t`, bounded by a one-year
    /// window.
    pub fn next_after(&self, t: f64) -> Option<f64> {
        self.first_after(t).filter(|fire| fire - t <= NEXT_MAX_SECONDS)
    }

    fn first_after(&self, t: f64) -> Option<f64> {
        let after = datetime(t)?;
        self.inner
            .after(&after)
            .next()
            .map(|fire| fire.timestamp() as f64)
    }
}

fn datetime(t: f64) -> Option<DateTime<Utc>> {
    let secs = t.floor();
    let nanos = ((t - secs) * 1e9).round() as u32;
    Utc.timestamp_opt(secs as i64, nanos.min(999_999_999)).single()
}

/// Stable per-name slot: leading 64 bits of the name's md5 digest.
fn hash_slot(slot_key: &str) -> u64 {
    let digest = md5::compute(slot_key.as_bytes());
    u64::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ])
}

/// Expand the `H` forms within one field. Fields without an `H` pass
/// through untouched.
fn expand_field(field: &str, lo: u64, hi: u64, slot: u64) -> Result<String, String> {
    if !field.contains('H') {
        return Ok(field.to_string());
    }

    if field == "H" {
        let span = hi - lo + 1;
        return Ok((lo + slot % span).to_string());
    }

    if let Some(step) = field.strip_prefix("H/") {
        let step: u64 = parse_step(step, field)?;
        let start = lo + slot % step;
        return Ok(format!("{start}-{hi}/{step}"));
    }

    if let Some(rest) = field.strip_prefix("H(") {
        let (range, step) = match rest.split_once(")") {
            Some((range, "")) => (range, None),
            Some((range, tail)) => match tail.strip_prefix('/') {
                Some(step) => (range, Some(parse_step(step, field)?)),
                None => return Err(field.to_string()),
            },
            None => return Err(field.to_string()),
        };
        let (a, b) = range.split_once('-').ok_or_else(|| field.to_string())?;
        let a: u64 = a.trim().parse().map_err(|_| field.to_string())?;
        let b: u64 = b.trim().parse().map_err(|_| field.to_string())?;
        if b < a {
            return Err(field.to_string());
        }
        return Ok(match step {
            Some(step) => format!("{}-{b}/{step}", a + slot % step),
            None => (a + slot % (b - a + 1)).to_string(),
        });
    }

    Err(field.to_string())
}

fn parse_step(step: &str, field: &str) -> Result<u64, String> {
    match step.parse::<u64>() {
        Ok(step) if step > 0 => Ok(step),
        _ => Err(field.to_string()),
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
