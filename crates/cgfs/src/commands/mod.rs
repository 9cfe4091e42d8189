use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use libcgfs::config::Resources;
use libcgfs::v1::Manager;
use oci_spec::runtime::Spec;

pub mod apply;
pub mod pids;
pub mod remove;
pub mod set;
pub mod stats;

/// Where the resource limits are read from. Without any source all limits
/// are left unset.
#[derive(Args, Debug, Default)]
pub struct ResourceSource {
    /// JSON file with resource limits, `-` reads from stdin
    #[clap(short, long, conflicts_with = "bundle")]
    pub resources: Option<PathBuf>,
    /// OCI bundle whose config.json provides linux.resources
    #[clap(short, long)]
    pub bundle: Option<PathBuf>,
    /// Overrides the maximum number of tasks
    #[clap(long, allow_hyphen_values = true)]
    pub pids_limit: Option<i64>,
    /// Overrides the relative cpu weight
    #[clap(long)]
    pub cpu_shares: Option<u64>,
}

impl ResourceSource {
    pub fn load(&self) -> Result<Resources> {
        let mut resources = if let Some(resources_path) = &self.resources {
            load_resources_json(resources_path)?
        } else if let Some(bundle) = &self.bundle {
            load_bundle_resources(bundle)?
        } else {
            Resources::default()
        };

        if let Some(pids_limit) = self.pids_limit {
            resources.pids_limit = pids_limit;
        }
        if let Some(cpu_shares) = self.cpu_shares {
            resources.cpu_shares = cpu_shares;
        }

        Ok(resources)
    }
}

fn load_resources_json(path: &Path) -> Result<Resources> {
    if path.to_string_lossy() == "-" {
        return serde_json::from_reader(io::stdin()).context("failed to parse resources from stdin");
    }

    let file = fs::File::open(path).with_context(|| format!("failed to open {path:?}"))?;
    serde_json::from_reader(io::BufReader::new(file))
        .with_context(|| format!("failed to parse resources from {path:?}"))
}

fn load_bundle_resources(bundle: &Path) -> Result<Resources> {
    let config = bundle.join("config.json");
    let spec = Spec::load(&config).with_context(|| format!("failed to load {config:?}"))?;

    let resources = spec
        .linux()
        .as_ref()
        .and_then(|linux| linux.resources().as_ref())
        .map(Resources::from)
        .unwrap_or_default();
    Ok(resources)
}

fn create_cgroup_manager(cgroup_path: &Path) -> Result<Manager> {
    Manager::new(cgroup_path)
        .with_context(|| format!("failed to create cgroup manager for {cgroup_path:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_without_source() {
        let source = ResourceSource {
            pids_limit: Some(-1),
            ..Default::default()
        };

        let resources = source.load().expect("load resources");
        assert_eq!(
            resources,
            Resources {
                pids_limit: -1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_load_json_with_override() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("resources.json");
        fs::write(&path, r#"{"cpuShares": 256, "cpuQuota": 50000, "pidsLimit": 10}"#).unwrap();
        let source = ResourceSource {
            resources: Some(path),
            cpu_shares: Some(1024),
            ..Default::default()
        };

        let resources = source.load().expect("load resources");
        assert_eq!(resources.cpu_shares, 1024);
        assert_eq!(resources.cpu_quota, 50000);
        assert_eq!(resources.pids_limit, 10);
    }

    #[test]
    fn test_load_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let config = serde_json::json!({
            "ociVersion": "1.0.2",
            "linux": {
                "resources": {
                    "cpu": { "shares": 512, "realtimeRuntime": 5000, "realtimePeriod": 7000 },
                    "pids": { "limit": 64 }
                }
            }
        });
        fs::write(tmp.path().join("config.json"), config.to_string()).unwrap();
        let source = ResourceSource {
            bundle: Some(tmp.path().to_path_buf()),
            ..Default::default()
        };

        let resources = source.load().expect("load resources");
        assert_eq!(resources.cpu_shares, 512);
        assert_eq!(resources.cpu_rt_runtime, 5000);
        assert_eq!(resources.cpu_rt_period, 7000);
        assert_eq!(resources.pids_limit, 64);
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let source = ResourceSource {
            resources: Some(tmp.path().join("missing.json")),
            ..Default::default()
        };

        assert!(source.load().is_err());
    }
}
