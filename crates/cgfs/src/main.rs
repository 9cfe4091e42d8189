//! # cgfs
//! Applies resource limits to cgroup v1 hierarchies and reports their usage.
mod commands;
mod observability;

use std::path::PathBuf;

use anyhow::Result;
use clap::{crate_version, Parser};

use crate::commands::{apply, pids, remove, set, stats};

#[derive(Parser, Debug)]
#[clap(version = crate_version!(), author = env!("CARGO_PKG_AUTHORS"))]
struct Opts {
    #[clap(flatten)]
    global: GlobalOpts,

    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser, Debug)]
struct GlobalOpts {
    /// Change log level to debug, but the `log-level` flag takes precedence
    #[clap(long, global = true)]
    debug: bool,
    /// Set the log file to write logs to (default is '/dev/stderr')
    #[clap(short, long, global = true)]
    log: Option<PathBuf>,
    /// Set the log format ('text' (default), or 'json')
    #[clap(long, global = true)]
    log_format: Option<String>,
    /// Set the log level (default is 'warn')
    #[clap(long, global = true)]
    log_level: Option<String>,
}

#[derive(Parser, Debug)]
enum SubCommand {
    Apply(apply::Apply),
    Set(set::Set),
    Stats(stats::Stats),
    Pids(pids::Pids),
    Remove(remove::Remove),
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    if let Err(e) = observability::init(&opts) {
        eprintln!("log init failed: {e:?}");
    }

    tracing::debug!(
        "started by user {} with {:?}",
        nix::unistd::geteuid(),
        std::env::args_os()
    );

    match opts.subcmd {
        SubCommand::Apply(args) => apply::apply(args),
        SubCommand::Set(args) => set::set(args),
        SubCommand::Stats(args) => stats::stats(args),
        SubCommand::Pids(args) => pids::pids(args),
        SubCommand::Remove(args) => remove::remove(args),
    }
}
