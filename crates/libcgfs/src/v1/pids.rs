use std::path::Path;

use super::controller::Controller;
use crate::common::{self, WrappedIoError};
use crate::config::Resources;
use crate::stats::{self, PidStatsError, Stats};

// Contains the maximum allowed number of active pids
const CGROUP_PIDS_MAX: &str = "pids.max";

#[derive(thiserror::Error, Debug)]
pub enum V1PidsControllerError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("failed to read pid stats: {0}")]
    Stats(#[from] PidStatsError),
}

pub struct Pids {}

impl Controller for Pids {
    type Error = V1PidsControllerError;

    /// Writes the limit unconditionally, a limit <= 0 lifts the ceiling
    fn set(cgroup_path: &Path, resources: &Resources) -> Result<(), Self::Error> {
        tracing::debug!("Set pids cgroup config");

        let limit = if resources.pids_limit > 0 {
            resources.pids_limit.to_string()
        } else {
            "max".to_string()
        };

        common::write_cgroup_file_str(cgroup_path.join(CGROUP_PIDS_MAX), &limit)?;
        Ok(())
    }

    fn get_stats(cgroup_path: &Path, stats: &mut Stats) -> Result<(), Self::Error> {
        stats::pid_stats(cgroup_path, &mut stats.pids)?;
        Ok(())
    }

    fn needs_to_handle(resources: &Resources) -> bool {
        resources.pids_limit != 0
    }
}
