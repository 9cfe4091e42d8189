use std::fs;
use std::path::{Path, PathBuf};

use super::controller::Controller;
use crate::common::{self, WrapIoResult, WrappedIoError};
use crate::config::{CgroupData, Resources};

const CGROUP_CPUSET_CPUS: &str = "cpuset.cpus";
const CGROUP_CPUSET_MEMS: &str = "cpuset.mems";

#[derive(thiserror::Error, Debug)]
pub enum V1CpuSetControllerError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("{path} has no parent to inherit {file} from")]
    MissingParent { path: PathBuf, file: &'static str },
}

pub struct CpuSet {}

impl Controller for CpuSet {
    type Error = V1CpuSetControllerError;

    fn apply(cgroup_path: &Path, data: &CgroupData) -> Result<(), Self::Error> {
        tracing::debug!("Apply CpuSet cgroup config");

        fs::create_dir_all(cgroup_path).wrap_create_dir(cgroup_path)?;
        Self::set(cgroup_path, data.resources)?;

        Self::ensure_not_empty(cgroup_path, CGROUP_CPUSET_CPUS)?;
        Self::ensure_not_empty(cgroup_path, CGROUP_CPUSET_MEMS)?;

        common::add_task(data.pid, cgroup_path)?;
        Ok(())
    }

    fn set(cgroup_path: &Path, resources: &Resources) -> Result<(), Self::Error> {
        if !resources.cpuset_cpus.is_empty() {
            common::write_cgroup_file_str(
                cgroup_path.join(CGROUP_CPUSET_CPUS),
                &resources.cpuset_cpus,
            )?;
        }

        if !resources.cpuset_mems.is_empty() {
            common::write_cgroup_file_str(
                cgroup_path.join(CGROUP_CPUSET_MEMS),
                &resources.cpuset_mems,
            )?;
        }

        Ok(())
    }

    fn needs_to_handle(resources: &Resources) -> bool {
        !resources.cpuset_cpus.is_empty() || !resources.cpuset_mems.is_empty()
    }
}

impl CpuSet {
    // if a task is moved into the cgroup and a value has not been set for cpus and mems
    // Errno 28 (no space left on device) will be returned. Therefore we set the value from
    // the nearest ancestor that has one, filling the directories in between on the way down.
    fn ensure_not_empty(
        cgroup_path: &Path,
        interface_file: &'static str,
    ) -> Result<String, V1CpuSetControllerError> {
        let current = common::get_cgroup_param_string(cgroup_path, interface_file)?;
        if !current.is_empty() {
            return Ok(current);
        }

        let parent = cgroup_path
            .parent()
            .ok_or_else(|| V1CpuSetControllerError::MissingParent {
                path: cgroup_path.to_path_buf(),
                file: interface_file,
            })?;
        let parent_value = Self::ensure_not_empty(parent, interface_file)?;

        tracing::debug!(
            "inherit {} {:?} from {:?}",
            interface_file,
            parent_value,
            parent
        );
        common::write_cgroup_file_str(cgroup_path.join(interface_file), &parent_value)?;
        Ok(parent_value)
    }
}
