use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use libcgfs::common::CgroupManager;

use super::{create_cgroup_manager, ResourceSource};

/// Update the resource limits of existing cgroups
#[derive(Parser, Debug)]
pub struct Set {
    /// Cgroup path relative to the subsystem mount points
    pub cgroup_path: PathBuf,
    #[clap(flatten)]
    pub source: ResourceSource,
}

pub fn set(args: Set) -> Result<()> {
    let resources = args.source.load()?;
    tracing::debug!(?resources, "set resources");

    create_cgroup_manager(&args.cgroup_path)?
        .set(&resources)
        .with_context(|| format!("failed to set resource limits of {:?}", args.cgroup_path))
}
