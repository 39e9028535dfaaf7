// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! if/unless guard expressions.
//!
//! A task may carry small predicate expressions deciding whether a
//! scheduled fire actually runs, e.g.:
//!
//! ```text
//! if: env.TESTY | default("0") | int == 1
//! ```
//!
//! The language is a value atom piped through filters, optionally compared
//! against a second pipeline. Parsing is deferred to evaluation time: a
//! malformed expression yields a [`ConfBracketError`] carrying the fallback
//! evaluation, so the scheduler warns and skips instead of aborting.

use crate::error::ConfBracketError;

/// Raw if/unless expressions attached to a task.
#[derive(Debug, Clone, Default)]
pub struct Guard {
    pub if_expr: Option<String>,
    pub unless_expr: Option<String>,
}

/// Environment lookup used during evaluation; injected for tests.
pub type EnvLookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

impl Guard {
    /// Whether the task may run: `if` (when present) must hold and
    /// `unless` (when present) must not.
    pub fn evaluate(&self, env: &EnvLookup<'_>) -> Result<bool, ConfBracketError> {
        if let Some(expr) = &self.if_expr {
            if !eval_expr(expr, env).map_err(|message| bracket_error("if", message))? {
                return Ok(false);
            }
        }
        if let Some(expr) = &self.unless_expr {
            if eval_expr(expr, env).map_err(|message| bracket_error("unless", message))? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Evaluate against the process environment.
    pub fn evaluate_env(&self) -> Result<bool, ConfBracketError> {
        self.evaluate(&|name| std::env::var(name).ok())
    }

    /// Whether any expression is configured.
    pub fn is_some(&self) -> bool {
        self.if_expr.is_some() || self.unless_expr.is_some()
    }
}

fn bracket_error(key: &'static str, message: String) -> ConfBracketError {
    ConfBracketError {
        key,
        message,
        // fail closed: an unevaluable guard suppresses the task
        evaluation: false,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Missing,
    Str(String),
    Int(i64),
    Bool(bool),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Missing => false,
            Value::Str(s) => !s.is_empty(),
            Value::Int(n) => *n != 0,
            Value::Bool(b) => *b,
        }
    }
}

const COMPARATORS: [&str; 6] = ["==", "!=", "<=", ">=", "<", ">"];

fn eval_expr(expr: &str, env: &EnvLookup<'_>) -> Result<bool, String> {
    match split_comparison(expr)? {
        Some((lhs, op, rhs)) => {
            let lhs = eval_pipeline(lhs, env)?;
            let rhs = eval_pipeline(rhs, env)?;
            compare(&lhs, op, &rhs)
        }
        None => Ok(eval_pipeline(expr, env)?.truthy()),
    }
}

/// Split at the single top-level comparator, if any. Comparators inside
/// string literals do not count.
fn split_comparison(expr: &str) -> Result<Option<(&str, &str, &str)>, String> {
    let bytes = expr.as_bytes();
    let mut quote: Option<u8> = None;
    let mut index = 0;

    while index < bytes.len() {
        let byte = bytes[index];
        match quote {
            Some(open) => {
                if byte == open {
                    quote = None;
                }
            }
            None => {
                if byte == b'"' || byte == b'\'' {
                    quote = Some(byte);
                } else {
                    for op in COMPARATORS {
                        if expr[index..].starts_with(op) {
                            let lhs = &expr[..index];
                            let rhs = &expr[index + op.len()..];
                            if lhs.trim().is_empty() || rhs.trim().is_empty() {
                                return Err(format!("dangling comparator {op:?}"));
                            }
                            if split_comparison(rhs)?.is_some() {
                                return Err("chained comparators are not supported".into());
                            }
                            return Ok(Some((lhs, op, rhs)));
                        }
                    }
                }
            }
        }
        index += 1;
    }

    if quote.is_some() {
        return Err("unterminated string literal".into());
    }
    Ok(None)
}

fn eval_pipeline(pipeline: &str, env: &EnvLookup<'_>) -> Result<Value, String> {
    let mut stages = split_pipes(pipeline)?.into_iter();
    let atom = stages.next().ok_or_else(|| "empty expression".to_string())?;
    let mut value = eval_atom(atom.trim(), env)?;
    for stage in stages {
        value = apply_filter(stage.trim(), value, env)?;
    }
    Ok(value)
}

/// Split on `|` outside string literals.
fn split_pipes(pipeline: &str) -> Result<Vec<&str>, String> {
    let bytes = pipeline.as_bytes();
    let mut quote: Option<u8> = None;
    let mut stages = Vec::new();
    let mut start = 0;

    for (index, byte) in bytes.iter().enumerate() {
        match quote {
            Some(open) if *byte == open => quote = None,
            Some(_) => {}
            None if *byte == b'"' || *byte == b'\'' => quote = Some(*byte),
            None if *byte == b'|' => {
                stages.push(&pipeline[start..index]);
                start = index + 1;
            }
            None => {}
        }
    }
    if quote.is_some() {
        return Err("unterminated string literal".into());
    }
    stages.push(&pipeline[start..]);
    Ok(stages)
}

fn eval_atom(atom: &str, env: &EnvLookup<'_>) -> Result<Value, String> {
    if atom.is_empty() {
        return Err("empty value".into());
    }

    if let Some(name) = atom.strip_prefix("env.") {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid environment variable name {name:?}"));
        }
        return Ok(env(name).map(Value::Str).unwrap_or(Value::Missing));
    }

    if (atom.starts_with('"') && atom.ends_with('"') && atom.len() >= 2)
        || (atom.starts_with('\'') && atom.ends_with('\'') && atom.len() >= 2)
    {
        return Ok(Value::Str(atom[1..atom.len() - 1].to_string()));
    }

    if atom == "true" {
        return Ok(Value::Bool(true));
    }
    if atom == "false" {
        return Ok(Value::Bool(false));
    }

    atom.parse::<i64>()
        .map(Value::Int)
        .map_err(|_| format!("unrecognized value {atom:?}"))
}

fn apply_filter(filter: &str, value: Value, env: &EnvLookup<'_>) -> Result<Value, String> {
    if let Some(argument) = filter.strip_prefix("default(").and_then(|rest| rest.strip_suffix(')'))
    {
        let fallback = eval_atom(argument.trim(), env)?;
        return Ok(match value {
            Value::Missing => fallback,
            value => value,
        });
    }

    match filter {
        "int" => match value {
            Value::Missing => Ok(Value::Missing),
            Value::Int(n) => Ok(Value::Int(n)),
            Value::Bool(b) => Ok(Value::Int(b as i64)),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("cannot convert {s:?} to int")),
        },
        "bool" => Ok(Value::Bool(match value {
            Value::Missing => false,
            Value::Bool(b) => b,
            Value::Int(n) => n != 0,
            Value::Str(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        })),
        "lower" => Ok(match value {
            Value::Str(s) => Value::Str(s.to_lowercase()),
            value => value,
        }),
        "trim" => Ok(match value {
            Value::Str(s) => Value::Str(s.trim().to_string()),
            value => value,
        }),
        _ => Err(format!("unknown filter {filter:?}")),
    }
}

fn compare(lhs: &Value, op: &str, rhs: &Value) -> Result<bool, String> {
    let equal = match (lhs, rhs) {
        (Value::Missing, _) | (_, Value::Missing) => false,
        (lhs, rhs) => lhs == rhs,
    };

    match op {
        "==" => return Ok(equal),
        "!=" => return Ok(!equal),
        _ => {}
    }

    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        _ => None,
    };

    let Some(ordering) = ordering else {
        return Ok(false);
    };

    Ok(match op {
        "<" => ordering.is_lt(),
        "<=" => ordering.is_le(),
        ">" => ordering.is_gt(),
        ">=" => ordering.is_ge(),
        _ => false,
    })
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
