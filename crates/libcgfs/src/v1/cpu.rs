use std::fs;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use super::controller::Controller;
use crate::common::{self, WrapIoResult, WrappedIoError};
use crate::config::{CgroupData, Resources};
use crate::stats::Stats;

const CGROUP_CPU_SHARES: &str = "cpu.shares";
const CGROUP_CPU_QUOTA: &str = "cpu.cfs_quota_us";
const CGROUP_CPU_PERIOD: &str = "cpu.cfs_period_us";
const CGROUP_CPU_RT_RUNTIME: &str = "cpu.rt_runtime_us";
const CGROUP_CPU_RT_PERIOD: &str = "cpu.rt_period_us";
const CGROUP_CPU_STAT: &str = "cpu.stat";

#[derive(thiserror::Error, Debug)]
pub enum V1CpuControllerError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("entry {line:?} in {path} is not a key value pair")]
    MalformedEntry { line: String, path: PathBuf },
    #[error("failed to parse value {value:?} of {key} in {path}: {err}")]
    ParseStat {
        key: String,
        value: String,
        path: PathBuf,
        err: ParseIntError,
    },
}

pub struct Cpu {}

impl Controller for Cpu {
    type Error = V1CpuControllerError;

    fn apply(cgroup_path: &Path, data: &CgroupData) -> Result<(), Self::Error> {
        tracing::debug!("Apply Cpu cgroup config");

        fs::create_dir_all(cgroup_path).wrap_create_dir(cgroup_path)?;
        // the kernel refuses realtime tasks while the group has no rt runtime
        Self::set_rt_bandwidth(cgroup_path, data.resources)?;
        common::add_task(data.pid, cgroup_path)?;

        Ok(())
    }

    fn set(cgroup_path: &Path, resources: &Resources) -> Result<(), Self::Error> {
        tracing::debug!("Set Cpu cgroup config");

        if resources.cpu_shares != 0 {
            common::write_cgroup_file(cgroup_path.join(CGROUP_CPU_SHARES), resources.cpu_shares)?;
        }

        if resources.cpu_period != 0 {
            common::write_cgroup_file(cgroup_path.join(CGROUP_CPU_PERIOD), resources.cpu_period)?;
        }

        if resources.cpu_quota != 0 {
            common::write_cgroup_file(cgroup_path.join(CGROUP_CPU_QUOTA), resources.cpu_quota)?;
        }

        Self::set_rt_bandwidth(cgroup_path, resources)?;

        Ok(())
    }

    fn get_stats(cgroup_path: &Path, stats: &mut Stats) -> Result<(), Self::Error> {
        let stat_path = cgroup_path.join(CGROUP_CPU_STAT);
        let content = match common::read_cgroup_file(&stat_path) {
            Ok(content) => content,
            Err(err) if err.is_not_found() => {
                tracing::debug!("{:?} does not exist, skipping cpu stats", stat_path);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let throttling = &mut stats.cpu.throttling;
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split_ascii_whitespace().collect();
            if fields.len() != 2 {
                return Err(V1CpuControllerError::MalformedEntry {
                    line: line.to_owned(),
                    path: stat_path,
                });
            }

            let field = match fields[0] {
                "nr_periods" => &mut throttling.periods,
                "nr_throttled" => &mut throttling.throttled_periods,
                "throttled_time" => &mut throttling.throttled_time,
                _ => continue,
            };

            *field = fields[1]
                .parse()
                .map_err(|err| V1CpuControllerError::ParseStat {
                    key: fields[0].to_owned(),
                    value: fields[1].to_owned(),
                    path: stat_path.clone(),
                    err,
                })?;
        }

        Ok(())
    }

    fn needs_to_handle(resources: &Resources) -> bool {
        resources.cpu_shares != 0
            || resources.cpu_quota != 0
            || resources.cpu_period != 0
            || resources.cpu_rt_runtime != 0
            || resources.cpu_rt_period != 0
    }
}

impl Cpu {
    fn set_rt_bandwidth(cgroup_path: &Path, resources: &Resources) -> Result<(), WrappedIoError> {
        if resources.cpu_rt_runtime != 0 {
            common::write_cgroup_file(
                cgroup_path.join(CGROUP_CPU_RT_RUNTIME),
                resources.cpu_rt_runtime,
            )?;
        }

        if resources.cpu_rt_period != 0 {
            common::write_cgroup_file(
                cgroup_path.join(CGROUP_CPU_RT_PERIOD),
                resources.cpu_rt_period,
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use nix::unistd::Pid;

    use super::*;
    use crate::common::CGROUP_PROCS;
    use crate::stats::ThrottlingData;
    use crate::test::{read_fixture, set_fixture, set_fixtures, setup};

    #[test]
    fn test_set_shares() {
        // arrange
        let (tmp, shares) = setup(CGROUP_CPU_SHARES);
        let resources = Resources {
            cpu_shares: 2048,
            ..Default::default()
        };

        // act
        Cpu::set(tmp.path(), &resources).expect("set cpu");

        // assert
        let content = fs::read_to_string(shares)
            .unwrap_or_else(|_| panic!("read {CGROUP_CPU_SHARES} file content"));
        assert_eq!(content, 2048.to_string());
    }

    quickcheck! {
        fn property_test_shares_roundtrip(shares: u64) -> bool {
            if shares == 0 {
                return true;
            }

            let (tmp, _) = setup(CGROUP_CPU_SHARES);
            let resources = Resources {
                cpu_shares: shares,
                ..Default::default()
            };

            Cpu::set(tmp.path(), &resources).expect("set cpu");
            common::get_cgroup_param_uint(tmp.path(), CGROUP_CPU_SHARES).expect("read shares") == shares
        }
    }

    #[test]
    fn test_set_zero_fields_are_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixtures(
            tmp.path(),
            &[(CGROUP_CPU_SHARES, "1024"), (CGROUP_CPU_QUOTA, "-1")],
        )
        .unwrap();
        let resources = Resources {
            cpu_period: 50000,
            ..Default::default()
        };
        set_fixture(tmp.path(), CGROUP_CPU_PERIOD, "100000").unwrap();

        Cpu::set(tmp.path(), &resources).expect("set cpu");

        assert_eq!(read_fixture(tmp.path(), CGROUP_CPU_SHARES), "1024");
        assert_eq!(read_fixture(tmp.path(), CGROUP_CPU_QUOTA), "-1");
        assert_eq!(read_fixture(tmp.path(), CGROUP_CPU_PERIOD), "50000");
    }

    #[test]
    fn test_set_bandwidth() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixtures(
            tmp.path(),
            &[
                (CGROUP_CPU_QUOTA, "8000"),
                (CGROUP_CPU_PERIOD, "10000"),
                (CGROUP_CPU_RT_RUNTIME, "8000"),
                (CGROUP_CPU_RT_PERIOD, "10000"),
            ],
        )
        .unwrap();
        let resources = Resources {
            cpu_quota: 5000,
            cpu_period: 7000,
            cpu_rt_runtime: 5000,
            cpu_rt_period: 7000,
            ..Default::default()
        };

        Cpu::set(tmp.path(), &resources).expect("set cpu");

        assert_eq!(read_fixture(tmp.path(), CGROUP_CPU_QUOTA), "5000");
        assert_eq!(read_fixture(tmp.path(), CGROUP_CPU_PERIOD), "7000");
        assert_eq!(read_fixture(tmp.path(), CGROUP_CPU_RT_RUNTIME), "5000");
        assert_eq!(read_fixture(tmp.path(), CGROUP_CPU_RT_PERIOD), "7000");
    }

    #[test]
    fn test_set_missing_shares_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixture(tmp.path(), CGROUP_CPU_PERIOD, "100000").unwrap();
        let resources = Resources {
            cpu_shares: 512,
            cpu_period: 50000,
            ..Default::default()
        };

        let err = Cpu::set(tmp.path(), &resources).unwrap_err();

        assert!(matches!(err, V1CpuControllerError::WrappedIo(ref e) if e.is_not_found()));
        // fail fast, the period is not attempted after the shares failed
        assert_eq!(read_fixture(tmp.path(), CGROUP_CPU_PERIOD), "100000");
    }

    #[test]
    fn test_apply_sets_rt_bandwidth_and_joins() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixtures(
            tmp.path(),
            &[
                (CGROUP_CPU_RT_RUNTIME, "0"),
                (CGROUP_CPU_RT_PERIOD, "1000000"),
                (CGROUP_PROCS, ""),
            ],
        )
        .unwrap();
        let resources = Resources {
            cpu_rt_runtime: 5000,
            cpu_rt_period: 7000,
            ..Default::default()
        };
        let data = CgroupData::new(&resources, Pid::from_raw(1234), "test");

        Cpu::apply(tmp.path(), &data).expect("apply cpu");

        assert_eq!(read_fixture(tmp.path(), CGROUP_CPU_RT_RUNTIME), "5000");
        assert_eq!(read_fixture(tmp.path(), CGROUP_CPU_RT_PERIOD), "7000");
        assert_eq!(read_fixture(tmp.path(), CGROUP_PROCS), "1234");
    }

    #[test]
    fn test_apply_rt_write_failure_does_not_join() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixture(tmp.path(), CGROUP_PROCS, "").unwrap();
        let resources = Resources {
            cpu_rt_runtime: 5000,
            ..Default::default()
        };
        let data = CgroupData::new(&resources, Pid::from_raw(1234), "test");

        assert!(Cpu::apply(tmp.path(), &data).is_err());
        assert_eq!(read_fixture(tmp.path(), CGROUP_PROCS), "");
    }

    #[test]
    fn test_stat_cpu_throttling() {
        let tmp = tempfile::tempdir().unwrap();
        let stat_content = &[
            "nr_periods 165000",
            "nr_throttled 27",
            "throttled_time 1080",
            "nr_bursts 3",
        ]
        .join("\n");
        set_fixture(tmp.path(), CGROUP_CPU_STAT, stat_content).expect("create stat file");

        let mut stats = Stats::default();
        Cpu::get_stats(tmp.path(), &mut stats).expect("get cgroup stats");
        let expected = ThrottlingData {
            periods: 165000,
            throttled_periods: 27,
            throttled_time: 1080,
        };
        assert_eq!(stats.cpu.throttling, expected);
    }

    #[test]
    fn test_stat_missing_file() {
        let tmp = tempfile::tempdir().unwrap();

        let mut stats = Stats::default();
        Cpu::get_stats(tmp.path(), &mut stats).expect("missing cpu.stat is tolerated");

        assert_eq!(stats.cpu.throttling, ThrottlingData::default());
    }

    #[test]
    fn test_stat_malformed_value() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixture(
            tmp.path(),
            CGROUP_CPU_STAT,
            "nr_periods 10\nthrottled_time fortytwo\n",
        )
        .unwrap();

        let mut stats = Stats::default();
        let err = Cpu::get_stats(tmp.path(), &mut stats).unwrap_err();

        assert!(matches!(err, V1CpuControllerError::ParseStat { ref key, .. } if key == "throttled_time"));
        assert_eq!(stats.cpu.throttling.periods, 10);
    }

    #[test]
    fn test_stat_unknown_key_is_not_parsed() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixture(
            tmp.path(),
            CGROUP_CPU_STAT,
            "nr_periods 1\nsome_future_key n/a\nnr_throttled 2\n",
        )
        .unwrap();

        let mut stats = Stats::default();
        Cpu::get_stats(tmp.path(), &mut stats).expect("get cgroup stats");

        assert_eq!(stats.cpu.throttling.periods, 1);
        assert_eq!(stats.cpu.throttling.throttled_periods, 2);
    }

    #[test]
    fn test_stat_max_throttled_time() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixture(
            tmp.path(),
            CGROUP_CPU_STAT,
            "nr_periods 0\nnr_throttled 0\nthrottled_time 18446744073709551615\n",
        )
        .unwrap();

        let mut stats = Stats::default();
        Cpu::get_stats(tmp.path(), &mut stats).expect("get cgroup stats");

        assert_eq!(stats.cpu.throttling.throttled_time, u64::MAX);
    }

    #[test]
    fn test_needs_to_handle() {
        assert!(!Cpu::needs_to_handle(&Resources::default()));
        assert!(Cpu::needs_to_handle(&Resources {
            cpu_rt_period: 1,
            ..Default::default()
        }));
    }
}
