// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `fate exec` command: immediate one-off execution of a task.
//!
//! Bypasses the scheduler entirely: the task's command runs to completion
//! with captured output and a printed report. Intended for debugging task
//! configuration; state pipes are not provided.

use anyhow::Context;
use clap::Args;
use fate_conf::Conf;
use fate_core::TaskOutcome;
use fate_sched::spawn::which;
use std::io::Write;
use std::process::{Command, ExitCode, Stdio};

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Name of the configured task to execute
    task: String,

    /// Do not print the report
    #[arg(long)]
    no_report: bool,
}

pub fn exec(conf: &Conf, args: ExecArgs) -> anyhow::Result<ExitCode> {
    let Some(spec) = conf.tasks.get(&args.task) else {
        eprintln!(
            "fate: error: unknown task: {} (configured: {})",
            args.task,
            conf.tasks.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        return Ok(ExitCode::from(78));
    };

    let Some(program) = spec.exec.first() else {
        eprintln!("fate: error: {}: empty command", spec.name);
        return Ok(ExitCode::from(78));
    };

    let Some(executable) = which(program) else {
        eprintln!("fate: error: {program}: command not found on path");
        return Ok(ExitCode::from(127));
    };

    let mut child = Command::new(executable)
        .args(&spec.exec[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // a param read from an inherited TTY is deliberate here
        .env("FATE_READ_TTY_PARAM", "1")
        .spawn()
        .with_context(|| format!("{}: could not spawn", spec.name))?;

    let writer = child.stdin.take().map(|mut stdin| {
        let param = spec.param.clone();
        // fed concurrently so a large param cannot deadlock against the
        // output pipes; the task may also exit without reading it
        std::thread::spawn(move || {
            let _ = stdin.write_all(&param);
        })
    });

    let output = child
        .wait_with_output()
        .with_context(|| format!("{}: could not collect output", spec.name))?;
    if let Some(writer) = writer {
        let _ = writer.join();
    }
    let code = output.status.code().unwrap_or(-1);

    if !args.no_report {
        print_report(&spec.name, &spec.exec, code, &output.stdout, &output.stderr);
    }

    Ok(ExitCode::SUCCESS)
}

fn print_report(name: &str, exec: &[String], code: i32, stdout: &[u8], stderr: &[u8]) {
    println!("Name: {name}");
    println!("Command: {}", exec.join(" "));
    println!();
    println!("Status: {} (Exit code {code})", TaskOutcome::from_code(code));
    println!();

    match std::str::from_utf8(stdout) {
        Ok(text) if !text.is_empty() => print_block("Result", text),
        Ok(_) => println!("Result: -"),
        Err(_) => println!("Result: <binary or bad output>"),
    }

    if !stderr.is_empty() {
        println!();
        match std::str::from_utf8(stderr) {
            Ok(text) => {
                // make the record separators visual
                let formatted = text.replace('\0', "\n\n");
                print_block("Logged (standard error)", formatted.trim());
            }
            Err(_) => println!("Logged (standard error): <could not decode stderr logs>"),
        }
    }
}

fn print_block(label: &str, text: &str) {
    if text.contains('\n') {
        println!("{label}:");
        println!();
        for line in text.lines() {
            println!("  {line}");
        }
    } else {
        println!("{label}: {text}");
    }
}
