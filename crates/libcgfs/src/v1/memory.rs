use std::collections::HashMap;
use std::path::Path;

use nix::errno::Errno;

use super::controller::Controller;
use crate::common::{self, ParseParamError, WrappedIoError};
use crate::config::Resources;
use crate::stats::{self, MemoryData, ParseFlatKeyedDataError, Stats};

const CGROUP_MEMORY_SWAP_LIMIT: &str = "memory.memsw.limit_in_bytes";
const CGROUP_MEMORY_LIMIT: &str = "memory.limit_in_bytes";
const CGROUP_MEMORY_USAGE: &str = "memory.usage_in_bytes";
const CGROUP_MEMORY_MAX_USAGE: &str = "memory.max_usage_in_bytes";
const CGROUP_MEMORY_SWAPPINESS: &str = "memory.swappiness";
const CGROUP_MEMORY_RESERVATION: &str = "memory.soft_limit_in_bytes";
const CGROUP_MEMORY_OOM_CONTROL: &str = "memory.oom_control";

// Shows various memory statistics
const MEMORY_STAT: &str = "memory.stat";
const MEMORY_USE_HIERARCHY: &str = "memory.use_hierarchy";
// Prefix for memory cgroup files
const MEMORY_PREFIX: &str = "memory";
// Prefix for memory and swap cgroup files
const MEMORY_AND_SWAP_PREFIX: &str = "memory.memsw";
// Prefix for kernel memory cgroup files
const MEMORY_KERNEL_PREFIX: &str = "memory.kmem";
// Prefix for kernel tcp memory cgroup files
const MEMORY_KERNEL_TCP_PREFIX: &str = "memory.kmem.tcp";
// Memory usage in bytes
const MEMORY_USAGE_IN_BYTES: &str = ".usage_in_bytes";
// Maximum recorded memory usage
const MEMORY_MAX_USAGE_IN_BYTES: &str = ".max_usage_in_bytes";
// Memory usage limit in bytes
const MEMORY_LIMIT_IN_BYTES: &str = ".limit_in_bytes";
// Number of times memory usage hit limits
const MEMORY_FAIL_COUNT: &str = ".failcnt";

#[derive(thiserror::Error, Debug)]
pub enum V1MemoryControllerError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("invalid swappiness value: {supplied}. valid range is 0-100")]
    SwappinessOutOfRange { supplied: u64 },
    #[error("failed to read memory parameter: {0}")]
    Param(#[from] ParseParamError),
    #[error("error parsing stat data: {0}")]
    Parse(#[from] ParseFlatKeyedDataError),
    #[error(
        "unable to set memory limit to {target} (current usage: {current}, peak usage: {peak})"
    )]
    UnableToSet {
        target: i64,
        current: u64,
        peak: u64,
    },
}

pub struct Memory {}

impl Controller for Memory {
    type Error = V1MemoryControllerError;

    fn set(cgroup_root: &Path, resources: &Resources) -> Result<(), Self::Error> {
        tracing::debug!("Set Memory cgroup config");

        if let Some(swappiness) = resources.memory_swappiness {
            if swappiness > 100 {
                return Err(V1MemoryControllerError::SwappinessOutOfRange {
                    supplied: swappiness,
                });
            }
        }

        Self::apply_limits(resources.memory, resources.memory_swap, cgroup_root)?;

        if resources.memory_reservation != 0 {
            common::write_cgroup_file(
                cgroup_root.join(CGROUP_MEMORY_RESERVATION),
                resources.memory_reservation,
            )?;
        }

        if resources.oom_kill_disable {
            common::write_cgroup_file(cgroup_root.join(CGROUP_MEMORY_OOM_CONTROL), 1)?;
        }

        if let Some(swappiness) = resources.memory_swappiness {
            common::write_cgroup_file(cgroup_root.join(CGROUP_MEMORY_SWAPPINESS), swappiness)?;
        }

        Ok(())
    }

    fn get_stats(cgroup_path: &Path, stats: &mut Stats) -> Result<(), Self::Error> {
        let memory = &mut stats.memory;
        memory.memory = Self::get_memory_data(cgroup_path, MEMORY_PREFIX)?;
        memory.memswap = Self::get_optional_memory_data(cgroup_path, MEMORY_AND_SWAP_PREFIX)?;
        memory.kernel = Self::get_optional_memory_data(cgroup_path, MEMORY_KERNEL_PREFIX)?;
        memory.kernel_tcp =
            Self::get_optional_memory_data(cgroup_path, MEMORY_KERNEL_TCP_PREFIX)?;
        memory.hierarchy = Self::hierarchy_enabled(cgroup_path)?;
        memory.stats = Self::get_stat_data(cgroup_path)?;
        memory.cache = memory.stats.get("cache").copied().unwrap_or_default();

        Ok(())
    }

    fn needs_to_handle(resources: &Resources) -> bool {
        resources.memory != 0
            || resources.memory_swap != 0
            || resources.memory_reservation != 0
            || resources.memory_swappiness.is_some()
            || resources.oom_kill_disable
    }
}

impl Memory {
    fn get_memory_data(
        cgroup_path: &Path,
        file_prefix: &str,
    ) -> Result<MemoryData, ParseParamError> {
        let param = |suffix: &str| {
            common::get_cgroup_param_uint(cgroup_path, &format!("{file_prefix}{suffix}"))
        };

        Ok(MemoryData {
            usage: param(MEMORY_USAGE_IN_BYTES)?,
            max_usage: param(MEMORY_MAX_USAGE_IN_BYTES)?,
            limit: param(MEMORY_LIMIT_IN_BYTES)?,
            fail_count: param(MEMORY_FAIL_COUNT)?,
        })
    }

    // swap and kernel memory accounting can be compiled out or disabled at boot
    fn get_optional_memory_data(
        cgroup_path: &Path,
        file_prefix: &str,
    ) -> Result<MemoryData, ParseParamError> {
        match Self::get_memory_data(cgroup_path, file_prefix) {
            Err(err) if err.is_not_found() => Ok(MemoryData::default()),
            result => result,
        }
    }

    fn hierarchy_enabled(cgroup_path: &Path) -> Result<bool, WrappedIoError> {
        let hierarchy = common::get_cgroup_param_string(cgroup_path, MEMORY_USE_HIERARCHY)?;
        Ok(hierarchy == "1")
    }

    fn get_stat_data(cgroup_path: &Path) -> Result<HashMap<String, u64>, ParseFlatKeyedDataError> {
        stats::parse_flat_keyed_data(&cgroup_path.join(MEMORY_STAT))
    }

    fn get_memory_limit(cgroup_root: &Path) -> Result<i64, ParseParamError> {
        let limit = common::get_cgroup_param_uint(cgroup_root, CGROUP_MEMORY_LIMIT)?;
        Ok(i64::try_from(limit).unwrap_or(i64::MAX))
    }

    fn set_memory(val: i64, cgroup_root: &Path) -> Result<(), V1MemoryControllerError> {
        if val == 0 {
            return Ok(());
        }

        match common::write_cgroup_file(cgroup_root.join(CGROUP_MEMORY_LIMIT), val) {
            Ok(()) => Ok(()),
            // the kernel refuses a limit below the current usage
            Err(err) if err.inner().raw_os_error() == Some(Errno::EBUSY as i32) => {
                let current = common::get_cgroup_param_uint(cgroup_root, CGROUP_MEMORY_USAGE)?;
                let peak = common::get_cgroup_param_uint(cgroup_root, CGROUP_MEMORY_MAX_USAGE)?;
                Err(V1MemoryControllerError::UnableToSet {
                    target: val,
                    current,
                    peak,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn set_swap(swap: i64, cgroup_root: &Path) -> Result<(), V1MemoryControllerError> {
        if swap == 0 {
            return Ok(());
        }

        common::write_cgroup_file(cgroup_root.join(CGROUP_MEMORY_SWAP_LIMIT), swap)?;
        Ok(())
    }

    fn set_memory_and_swap(
        limit: i64,
        swap: i64,
        swap_first: bool,
        cgroup_root: &Path,
    ) -> Result<(), V1MemoryControllerError> {
        // memsw.limit_in_bytes may never drop below limit_in_bytes, so the write
        // that would temporarily violate this has to come second
        if swap_first {
            Self::set_swap(swap, cgroup_root)?;
            Self::set_memory(limit, cgroup_root)?;
        } else {
            Self::set_memory(limit, cgroup_root)?;
            Self::set_swap(swap, cgroup_root)?;
        }
        Ok(())
    }

    fn apply_limits(limit: i64, swap: i64, cgroup_root: &Path) -> Result<(), V1MemoryControllerError> {
        if limit == 0 {
            return Self::set_memory_and_swap(0, swap, false, cgroup_root);
        }

        let current_limit = Self::get_memory_limit(cgroup_root)?;
        if swap != 0 {
            let swap_first = swap == -1 || current_limit < swap;
            Self::set_memory_and_swap(limit, swap, swap_first, cgroup_root)
        } else if limit == -1 {
            // an unlimited memory limit lifts the swap limit too
            Self::set_memory_and_swap(limit, -1, true, cgroup_root)
        } else {
            Self::set_memory_and_swap(limit, 0, current_limit < 0, cgroup_root)
        }
    }
}
