use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use libcgfs::common::CgroupManager;

use super::create_cgroup_manager;

/// List the tasks inside the cgroups
#[derive(Parser, Debug)]
pub struct Pids {
    /// Cgroup path relative to the subsystem mount points
    pub cgroup_path: PathBuf,
    /// Output format, either table or json
    #[clap(short, long, default_value = "table")]
    pub format: String,
}

pub fn pids(args: Pids) -> Result<()> {
    let pids: Vec<i32> = create_cgroup_manager(&args.cgroup_path)?
        .get_all_pids()?
        .iter()
        .map(|pid| pid.as_raw())
        .collect();

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string(&pids)?),
        "table" => {
            println!("PID");
            for pid in pids {
                println!("{pid}");
            }
        }
        unknown => bail!("unknown format: {}", unknown),
    }

    Ok(())
}
