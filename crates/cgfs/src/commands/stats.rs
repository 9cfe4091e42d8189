use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use libcgfs::v1::V1ManagerError;

use super::create_cgroup_manager;

/// Print the resource usage statistics as JSON. Sections that could be read
/// are printed even when other subsystems fail.
#[derive(Parser, Debug)]
pub struct Stats {
    /// Cgroup path relative to the subsystem mount points
    pub cgroup_path: PathBuf,
    /// Print on a single line
    #[clap(long)]
    pub compact: bool,
}

pub fn stats(args: Stats) -> Result<()> {
    let (stats, failures) = create_cgroup_manager(&args.cgroup_path)?.collect_stats();

    if args.compact {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    if !failures.is_empty() {
        return Err(V1ManagerError::Stats(failures).into());
    }

    Ok(())
}
