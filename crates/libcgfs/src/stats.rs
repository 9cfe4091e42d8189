use std::collections::HashMap;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::common;
use crate::common::WrappedIoError;

/// Usage snapshot of one container. Each controller only touches its own
/// section, so sections of subsystems that are not mounted stay zeroed.
#[derive(Debug, Serialize, Default)]
pub struct Stats {
    pub cpu: CpuStats,
    pub pids: PidStats,
    pub memory: MemoryStats,
}

/// Filled by the cpu (throttling) and cpuacct (usage) controllers
#[derive(Debug, Default, Serialize)]
pub struct CpuStats {
    pub usage: CpuUsage,
    pub throttling: ThrottlingData,
}

/// Cpu time in nanoseconds as accounted by cpuacct
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct CpuUsage {
    pub usage_total: u64,
    pub usage_user: u64,
    pub usage_kernel: u64,
    /// Indexed by cpu number
    pub per_core_usage_total: Vec<u64>,
    pub per_core_usage_user: Vec<u64>,
    pub per_core_usage_kernel: Vec<u64>,
}

/// Counters from `cpu.stat`
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct ThrottlingData {
    /// Elapsed enforcement periods
    pub periods: u64,
    /// Periods in which the group ran out of quota
    pub throttled_periods: u64,
    /// Nanoseconds spent throttled
    pub throttled_time: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct MemoryStats {
    /// `memory.*`
    pub memory: MemoryData,
    /// `memory.memsw.*`, zeroed when swap accounting is disabled
    pub memswap: MemoryData,
    /// `memory.kmem.*`
    pub kernel: MemoryData,
    /// `memory.kmem.tcp.*`
    pub kernel_tcp: MemoryData,
    /// Page cache in bytes, lifted out of `memory.stat`
    pub cache: u64,
    /// Value of `memory.use_hierarchy`
    pub hierarchy: bool,
    /// Everything `memory.stat` reports
    pub stats: HashMap<String, u64>,
}

/// The four counters every memory family exposes
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct MemoryData {
    pub usage: u64,
    pub max_usage: u64,
    pub fail_count: u64,
    pub limit: u64,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct PidStats {
    /// Tasks currently in the group
    pub current: u64,
    /// Configured maximum, 0 when unlimited
    pub limit: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum ParseFlatKeyedDataError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("flat keyed data at {path} contains entries that do not conform to 'key value'")]
    DoesNotConform { path: PathBuf },
    #[error("failed to parse value {value} of {key} from {path}")]
    FailedToParse {
        key: String,
        value: String,
        path: PathBuf,
        err: ParseIntError,
    },
}

impl ParseFlatKeyedDataError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ParseFlatKeyedDataError::WrappedIo(err) if err.is_not_found())
    }
}

/// Reads a file made of `key value` lines into a map. Blank lines are
/// ignored, anything else that is not exactly two fields is rejected.
pub(crate) fn parse_flat_keyed_data(
    file_path: &Path,
) -> Result<HashMap<String, u64>, ParseFlatKeyedDataError> {
    let content = common::read_cgroup_file(file_path)?;
    let mut entries = HashMap::new();

    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (key, value) = line
            .split_once(char::is_whitespace)
            .map(|(k, v)| (k, v.trim()))
            .filter(|(_, v)| !v.is_empty() && !v.contains(char::is_whitespace))
            .ok_or_else(|| ParseFlatKeyedDataError::DoesNotConform {
                path: file_path.to_path_buf(),
            })?;

        let parsed = value
            .parse()
            .map_err(|err| ParseFlatKeyedDataError::FailedToParse {
                key: key.to_owned(),
                value: value.to_owned(),
                path: file_path.to_path_buf(),
                err,
            })?;
        entries.insert(key.to_owned(), parsed);
    }

    Ok(entries)
}

#[derive(thiserror::Error, Debug)]
pub enum PidStatsError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("failed to parse current pids {value:?}: {err}")]
    ParseCurrent { value: String, err: ParseIntError },
    #[error("failed to parse pids limit {value:?}: {err}")]
    ParseLimit { value: String, err: ParseIntError },
}

/// Fills in the pid statistics of the cgroup. An unlimited `pids.max` is
/// reported as a limit of 0.
pub fn pid_stats(cgroup_path: &Path, stats: &mut PidStats) -> Result<(), PidStatsError> {
    let current = common::get_cgroup_param_string(cgroup_path, "pids.current")?;
    stats.current = current
        .parse()
        .map_err(|err| PidStatsError::ParseCurrent {
            value: current.clone(),
            err,
        })?;

    let limit = common::get_cgroup_param_string(cgroup_path, "pids.max")?;
    stats.limit = if limit == "max" {
        0
    } else {
        limit
            .parse()
            .map_err(|err| PidStatsError::ParseLimit {
                value: limit.clone(),
                err,
            })?
    };

    Ok(())
}
