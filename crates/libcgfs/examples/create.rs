use std::path::Path;
use std::process::Command;

use anyhow::Result;
use libcgfs::common::CgroupManager;
use libcgfs::config::{CgroupData, Resources};
use libcgfs::v1::Manager;
use nix::unistd::Pid;

fn main() -> Result<()> {
    // Create cgroup manager
    let manager = Manager::new(Path::new("example-cgroup"))?;

    // Run process
    let mut child = Command::new("sh").args(["-c", "sleep 100"]).spawn()?;

    // Add the new process to the cgroup and restrict it
    let resources = Resources {
        cpu_shares: 512,
        pids_limit: 16,
        ..Default::default()
    };
    manager.apply(&CgroupData::new(
        &resources,
        Pid::from_raw(child.id() as i32),
        "example",
    ))?;
    manager.set(&resources)?;

    println!("{}", serde_json::to_string_pretty(&manager.stats()?)?);

    child.kill()?;
    child.wait()?;
    manager.remove()?;

    Ok(())
}
