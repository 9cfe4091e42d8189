use std::path::Path;
use std::time::Duration;

use crate::common::{self, WrappedIoError};
use crate::config::{CgroupData, Resources};
use crate::stats::Stats;

/// Capabilities every v1 subsystem controller offers. Controllers are
/// stateless, the cgroup path of the subsystem is passed to each call.
pub(super) trait Controller {
    type Error: From<WrappedIoError>;

    /// Creates the cgroup, applies limits that have to be in place before the
    /// task can join and moves the task into the cgroup
    fn apply(cgroup_path: &Path, data: &CgroupData) -> Result<(), Self::Error> {
        common::add_task(data.pid, cgroup_path)?;
        Ok(())
    }

    /// Applies resource restrictions to the cgroup
    fn set(cgroup_path: &Path, resources: &Resources) -> Result<(), Self::Error>;

    /// Fills in the section of `stats` the controller is responsible for
    fn get_stats(_cgroup_path: &Path, _stats: &mut Stats) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Deletes the cgroup. Fails if tasks are still attached after a few retries.
    fn remove(cgroup_path: &Path) -> Result<(), Self::Error> {
        common::delete_with_retry(cgroup_path, 4, Duration::from_millis(100))?;
        Ok(())
    }

    /// Checks if the controller needs to handle this request
    fn needs_to_handle(resources: &Resources) -> bool;
}
