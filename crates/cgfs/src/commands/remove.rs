use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use libcgfs::common::CgroupManager;

use super::create_cgroup_manager;

/// Kill the remaining tasks and delete the cgroups
#[derive(Parser, Debug)]
pub struct Remove {
    /// Cgroup path relative to the subsystem mount points
    pub cgroup_path: PathBuf,
}

pub fn remove(args: Remove) -> Result<()> {
    create_cgroup_manager(&args.cgroup_path)?
        .remove()
        .with_context(|| format!("failed to remove {:?}", args.cgroup_path))
}
