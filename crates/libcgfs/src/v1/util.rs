use std::collections::HashMap;
use std::path::{Path, PathBuf};

use procfs::process::Process;
use procfs::ProcError;

use super::controller_type::CONTROLLERS;
use super::ControllerType;

#[derive(thiserror::Error, Debug)]
pub enum V1MountPointError {
    #[error("failed to read process info from /proc/self: {0}")]
    ReadSelf(ProcError),
    #[error("failed to get mountinfo: {0}")]
    MountInfo(ProcError),
}

fn cgroup_mount_points() -> Result<Vec<PathBuf>, V1MountPointError> {
    Ok(Process::myself()
        .map_err(V1MountPointError::ReadSelf)?
        .mountinfo()
        .map_err(V1MountPointError::MountInfo)?
        .into_iter()
        .filter(|m| m.fs_type == "cgroup")
        .map(|m| m.mount_point)
        .collect())
}

/// List the mount points of all currently supported cgroup subsystems. Subsystems
/// that are not mounted are left out.
pub fn list_supported_mount_points() -> Result<HashMap<ControllerType, PathBuf>, V1MountPointError>
{
    let mount_points = cgroup_mount_points()?;
    let mut mount_paths = HashMap::with_capacity(CONTROLLERS.len());

    for controller in CONTROLLERS {
        match find_mount_point(&mount_points, controller) {
            Some(mount_point) => {
                mount_paths.insert(*controller, mount_point.to_path_buf());
            }
            None => tracing::debug!("no mount point for {}", controller),
        }
    }

    Ok(mount_paths)
}

fn find_mount_point<'a>(mount_points: &'a [PathBuf], subsystem: &ControllerType) -> Option<&'a Path> {
    let subsystem_name = subsystem.as_ref();
    mount_points
        .iter()
        .find(|m| {
            // cpu and cpuacct are commonly mounted together, in either order
            match subsystem {
                ControllerType::Cpu | ControllerType::CpuAcct => {
                    m.ends_with("cpu,cpuacct")
                        || m.ends_with("cpuacct,cpu")
                        || m.ends_with(subsystem_name)
                }
                _ => m.ends_with(subsystem_name),
            }
        })
        .map(PathBuf::as_path)
}
