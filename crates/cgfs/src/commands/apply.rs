use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use libcgfs::common::CgroupManager;
use libcgfs::config::CgroupData;
use nix::unistd::Pid;

use super::{create_cgroup_manager, ResourceSource};

/// Create the cgroups, move a task into them and apply the resource limits
#[derive(Parser, Debug)]
pub struct Apply {
    /// Cgroup path relative to the subsystem mount points
    pub cgroup_path: PathBuf,
    /// Task to move into the cgroups, -1 only creates them
    #[clap(short, long, allow_hyphen_values = true)]
    pub pid: i32,
    /// Name used in log messages
    #[clap(short, long, default_value = "cgfs")]
    pub name: String,
    #[clap(flatten)]
    pub source: ResourceSource,
}

pub fn apply(args: Apply) -> Result<()> {
    let resources = args.source.load()?;
    let cmanager = create_cgroup_manager(&args.cgroup_path)?;

    let data = CgroupData::new(&resources, Pid::from_raw(args.pid), args.name.as_str());
    cmanager
        .apply(&data)
        .with_context(|| format!("failed to apply cgroups for {}", args.name))?;
    cmanager
        .set(&resources)
        .with_context(|| format!("failed to set resource limits for {}", args.name))?;

    tracing::info!(pid = args.pid, "applied cgroup {:?}", args.cgroup_path);
    Ok(())
}
