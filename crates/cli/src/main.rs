// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fate: periodic execution of configured commands.
//!
//! `fate run` performs one check-and-drain cycle: every task whose
//! schedule fired since the last recorded check is executed, subject to
//! tenancy and timeouts, and a one-line report is printed per completed
//! task. `fate exec` runs a single task immediately, regardless of its
//! schedule, and prints a full report of the invocation.

mod exec;
mod run;

use clap::{Parser, Subcommand};
use fate_conf::{Conf, ConfError, PrefixPaths};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fate", version, about = "Periodic execution of configured commands")]
struct Cli {
    /// Directory holding the task configuration files
    #[arg(long, global = true, value_name = "DIR")]
    conf: Option<PathBuf>,

    /// Override the state directory prefix
    #[arg(long, global = true, value_name = "DIR")]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute tasks which have come due and collect their results
    Run(run::RunArgs),

    /// Execute a single configured task immediately
    Exec(exec::ExecArgs),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let conf = match load_conf(&cli) {
        Ok(conf) => conf,
        Err(error) => {
            eprintln!("fate: error: {error}");
            return exit_code(error.exit_code());
        }
    };

    let result = match cli.command {
        Command::Run(args) => run::run(&conf, args),
        Command::Exec(args) => exec::exec(&conf, args),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("fate: error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_conf(cli: &Cli) -> Result<Conf, ConfError> {
    let mut prefix = PrefixPaths::discover();
    if let Some(state) = &cli.state {
        prefix.state = state.clone();
    }

    let conf_dir = cli
        .conf
        .clone()
        .unwrap_or_else(|| prefix.conf.join(fate_conf::LIB_NAME));

    Conf::load(&conf_dir, prefix)
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    #[test]
    fn missing_configuration_maps_to_72() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli(&["fate", "run", "--conf", dir.path().to_str().unwrap()]);
        let error = load_conf(&cli).unwrap_err();
        assert_eq!(error.exit_code(), 72);
    }

    #[test]
    fn syntax_error_maps_to_65() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tasks.toml"), "not [valid").unwrap();
        let cli = cli(&["fate", "run", "--conf", dir.path().to_str().unwrap()]);
        let error = load_conf(&cli).unwrap_err();
        assert_eq!(error.exit_code(), 65);
    }

    #[test]
    fn state_override_lands_in_the_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tasks.toml"), "").unwrap();
        let cli = cli(&[
            "fate",
            "run",
            "--conf",
            dir.path().to_str().unwrap(),
            "--state",
            "/tmp/elsewhere",
        ]);
        let conf = load_conf(&cli).unwrap();
        assert_eq!(conf.prefix.state, PathBuf::from("/tmp/elsewhere"));
    }
}
