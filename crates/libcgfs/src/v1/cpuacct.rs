use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use super::controller::Controller;
use crate::common::{self, WrappedIoError};
use crate::config::Resources;
use crate::stats::{parse_flat_keyed_data, CpuUsage, ParseFlatKeyedDataError, Stats};

// Contains user mode and kernel mode cpu consumption
const CGROUP_CPUACCT_STAT: &str = "cpuacct.stat";
// Contains overall cpu consumption
const CGROUP_CPUACCT_USAGE: &str = "cpuacct.usage";
// Contains user mode and kernel mode cpu consumption differentiated by core
const CGROUP_CPUACCT_USAGE_ALL: &str = "cpuacct.usage_all";
// Contains overall cpu consumption differentiated by core
const CGROUP_CPUACCT_PERCPU: &str = "cpuacct.usage_percpu";

#[derive(thiserror::Error, Debug)]
pub enum V1CpuAcctStatsError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("error parsing data: {0}")]
    ParseData(#[from] ParseFlatKeyedDataError),
    #[error("missing field {field} from {path}")]
    MissingField { field: &'static str, path: PathBuf },
    #[error("failed to parse total cpu usage {value:?}: {err}")]
    ParseTotalCpu { value: String, err: ParseIntError },
    #[error("failed to parse per core {mode} mode cpu usage in {path}: {err}")]
    FailedToParseField {
        mode: &'static str,
        path: PathBuf,
        err: ParseIntError,
    },
    #[error("failed to parse per core cpu usage: {0}")]
    ParsePerCore(ParseIntError),
}

/// Accounting only subsystem, it has nothing to configure
pub struct CpuAcct {}

impl Controller for CpuAcct {
    type Error = V1CpuAcctStatsError;

    fn set(_cgroup_path: &Path, _resources: &Resources) -> Result<(), Self::Error> {
        Ok(())
    }

    fn get_stats(cgroup_path: &Path, stats: &mut Stats) -> Result<(), Self::Error> {
        Self::get_total_cpu_usage(cgroup_path, &mut stats.cpu.usage)?;
        Self::get_per_core_usage(cgroup_path, &mut stats.cpu.usage)?;
        Ok(())
    }

    fn needs_to_handle(_resources: &Resources) -> bool {
        false
    }
}

impl CpuAcct {
    fn get_total_cpu_usage(
        cgroup_path: &Path,
        stats: &mut CpuUsage,
    ) -> Result<(), V1CpuAcctStatsError> {
        let stat_file_path = cgroup_path.join(CGROUP_CPUACCT_STAT);
        let stat_table = parse_flat_keyed_data(&stat_file_path)?;
        let field = |name: &'static str| {
            stat_table
                .get(name)
                .copied()
                .ok_or_else(|| V1CpuAcctStatsError::MissingField {
                    field: name,
                    path: stat_file_path.clone(),
                })
        };

        stats.usage_user = field("user")?;
        stats.usage_kernel = field("system")?;

        let total = common::get_cgroup_param_string(cgroup_path, CGROUP_CPUACCT_USAGE)?;
        stats.usage_total = total
            .parse()
            .map_err(|err| V1CpuAcctStatsError::ParseTotalCpu { value: total, err })?;

        Ok(())
    }

    fn get_per_core_usage(
        cgroup_path: &Path,
        stats: &mut CpuUsage,
    ) -> Result<(), V1CpuAcctStatsError> {
        let usage_all = cgroup_path.join(CGROUP_CPUACCT_USAGE_ALL);
        // not provided by kernels older than 4.7
        match common::read_cgroup_file(&usage_all) {
            Ok(content) => {
                // header row is "cpu user system"
                for row in content.lines().skip(1) {
                    if let Some((user, kernel)) = Self::parse_usage_all_row(row, &usage_all)? {
                        stats.per_core_usage_user.push(user);
                        stats.per_core_usage_kernel.push(kernel);
                    }
                }
            }
            Err(err) if err.is_not_found() => {
                tracing::debug!("{:?} does not exist, skipping per core mode usage", usage_all);
            }
            Err(err) => return Err(err.into()),
        }

        let percpu = common::read_cgroup_file(cgroup_path.join(CGROUP_CPUACCT_PERCPU))?;
        stats.per_core_usage_total = percpu
            .split_ascii_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(V1CpuAcctStatsError::ParsePerCore)?;

        Ok(())
    }

    /// Returns user and kernel time of a `cpu user system` row, rows with a
    /// different shape are skipped
    fn parse_usage_all_row(
        row: &str,
        path: &Path,
    ) -> Result<Option<(u64, u64)>, V1CpuAcctStatsError> {
        let (user, kernel) = match row.split_ascii_whitespace().collect::<Vec<_>>()[..] {
            [_, user, kernel] => (user, kernel),
            _ => return Ok(None),
        };

        let parse = |mode: &'static str, value: &str| {
            value
                .parse::<u64>()
                .map_err(|err| V1CpuAcctStatsError::FailedToParseField {
                    mode,
                    path: path.to_path_buf(),
                    err,
                })
        };

        Ok(Some((parse("user", user)?, parse("kernel", kernel)?)))
    }
}

#[cfg(test)]
mod tests {
    use nix::unistd::Pid;
    use tempfile::TempDir;

    use super::*;
    use crate::common::CGROUP_PROCS;
    use crate::config::CgroupData;
    use crate::test::{read_fixture, set_fixture, set_fixtures, setup};

    fn setup_total_cpu(stat_content: &str, usage_content: &str) -> TempDir {
        let tmp = tempfile::tempdir().unwrap();
        set_fixtures(
            tmp.path(),
            &[
                (CGROUP_CPUACCT_STAT, stat_content),
                (CGROUP_CPUACCT_USAGE, usage_content),
            ],
        )
        .expect("set cpuacct total fixtures");
        tmp
    }

    fn setup_per_core(percpu_content: &str, usage_all_content: &str) -> TempDir {
        let tmp = tempfile::tempdir().unwrap();
        set_fixtures(
            tmp.path(),
            &[
                (CGROUP_CPUACCT_PERCPU, percpu_content),
                (CGROUP_CPUACCT_USAGE_ALL, usage_all_content),
            ],
        )
        .expect("set cpuacct per core fixtures");
        tmp
    }

    #[test]
    fn test_apply_joins() {
        let (tmp, _) = setup(CGROUP_PROCS);
        let resources = Resources::default();
        let data = CgroupData::new(&resources, Pid::from_raw(1000), "test");

        CpuAcct::apply(tmp.path(), &data).expect("apply cpuacct");

        assert_eq!(read_fixture(tmp.path(), CGROUP_PROCS), "1000");
    }

    #[test]
    fn test_stat_total_cpu_usage() {
        let stat_content = &["user 1300888", "system 364592"].join("\n");
        let usage_content = "18198092369681\n";
        let tmp = setup_total_cpu(stat_content, usage_content);

        let mut stats = CpuUsage::default();
        CpuAcct::get_total_cpu_usage(tmp.path(), &mut stats).expect("get cgroup stats");

        assert_eq!(stats.usage_user, 1300888);
        assert_eq!(stats.usage_kernel, 364592);
        assert_eq!(stats.usage_total, 18198092369681);
    }

    #[test]
    fn test_stat_total_missing_field() {
        let tmp = setup_total_cpu("user 1300888", "1");

        let mut stats = CpuUsage::default();
        let result = CpuAcct::get_total_cpu_usage(tmp.path(), &mut stats);

        assert!(matches!(
            result,
            Err(V1CpuAcctStatsError::MissingField {
                field: "system",
                ..
            })
        ));
    }

    #[test]
    fn test_stat_per_cpu_usage() {
        let percpu_content = "989683000640 4409567860144 4439880333849 4273328034121";
        let usage_all_content = &[
            "cpu user system",
            "0 5838999815217 295316023007",
            "1 4139072325517 325194619244",
            "2 4175712075766 323435639997",
            "3 4021385867300 304269989810",
        ]
        .join("\n");
        let tmp = setup_per_core(percpu_content, usage_all_content);

        let mut stats = CpuUsage::default();
        CpuAcct::get_per_core_usage(tmp.path(), &mut stats).expect("get cgroup stats");

        assert_eq!(
            stats.per_core_usage_user,
            [5838999815217, 4139072325517, 4175712075766, 4021385867300]
        );

        assert_eq!(
            stats.per_core_usage_kernel,
            [295316023007, 325194619244, 323435639997, 304269989810]
        );

        assert_eq!(
            stats.per_core_usage_total,
            [989683000640, 4409567860144, 4439880333849, 4273328034121]
        );
    }

    #[test]
    fn test_stat_per_cpu_usage_without_usage_all() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixture(tmp.path(), CGROUP_CPUACCT_PERCPU, "10 20\n").unwrap();

        let mut stats = CpuUsage::default();
        CpuAcct::get_per_core_usage(tmp.path(), &mut stats).expect("get cgroup stats");

        assert_eq!(stats.per_core_usage_total, [10, 20]);
        assert!(stats.per_core_usage_user.is_empty());
    }

    #[test]
    fn test_stat_per_cpu_usage_bad_kernel_time() {
        let tmp = setup_per_core("1 2", "cpu user system\n0 1 x\n1 1 1\n");

        let mut stats = CpuUsage::default();
        let result = CpuAcct::get_per_core_usage(tmp.path(), &mut stats);

        assert!(matches!(
            result,
            Err(V1CpuAcctStatsError::FailedToParseField { mode: "kernel", .. })
        ));
    }

    #[test]
    fn test_usage_all_skips_short_rows() {
        let row = CpuAcct::parse_usage_all_row("0 12", Path::new(CGROUP_CPUACCT_USAGE_ALL));
        assert!(matches!(row, Ok(None)));

        let row = CpuAcct::parse_usage_all_row("3 12 34", Path::new(CGROUP_CPUACCT_USAGE_ALL));
        assert!(matches!(row, Ok(Some((12, 34)))));
    }

    #[test]
    fn test_get_stats_fills_cpu_usage() {
        let tmp = setup_total_cpu("user 3\nsystem 4\n", "7\n");
        set_fixture(tmp.path(), CGROUP_CPUACCT_PERCPU, "7").unwrap();
        set_fixture(tmp.path(), CGROUP_CPUACCT_USAGE_ALL, "cpu user system\n0 3 4\n").unwrap();

        let mut stats = Stats::default();
        CpuAcct::get_stats(tmp.path(), &mut stats).expect("get cgroup stats");

        assert_eq!(
            stats.cpu.usage,
            CpuUsage {
                usage_total: 7,
                usage_user: 3,
                usage_kernel: 4,
                per_core_usage_total: vec![7],
                per_core_usage_user: vec![3],
                per_core_usage_kernel: vec![4],
            }
        );
    }
}
