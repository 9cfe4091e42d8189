use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use procfs::process::Process;
use procfs::ProcError;

use super::controller::Controller;
use super::controller_type::{ControllerType as CtrlType, CONTROLLERS};
use super::cpu::{Cpu, V1CpuControllerError};
use super::cpuacct::{CpuAcct, V1CpuAcctStatsError};
use super::cpuset::{CpuSet, V1CpuSetControllerError};
use super::memory::{Memory, V1MemoryControllerError};
use super::pids::{Pids, V1PidsControllerError};
use super::util::{self, V1MountPointError};
use crate::common::{self, CgroupManager, JoinSafelyError, PathBufExt, WrappedIoError};
use crate::config::{CgroupData, Resources};
use crate::stats::Stats;

#[derive(thiserror::Error, Debug)]
pub enum V1ManagerError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("proc error: {0}")]
    ProcFs(#[from] ProcError),
    #[error("mount point error: {0}")]
    MountPoint(#[from] V1MountPointError),
    #[error("failed to join cgroup path: {0}")]
    JoinSafely(#[from] JoinSafelyError),
    #[error("cgroup {0} is required to fulfill the request, but is not supported by this system")]
    CGroupRequired(CtrlType),
    #[error("the current process is not a member of a {0} cgroup")]
    CGroupNotFound(CtrlType),
    #[error("subsystem does not exist")]
    SubsystemDoesNotExist,

    #[error(transparent)]
    CpuController(#[from] V1CpuControllerError),
    #[error(transparent)]
    CpuAcctController(#[from] V1CpuAcctStatsError),
    #[error(transparent)]
    CpuSetController(#[from] V1CpuSetControllerError),
    #[error(transparent)]
    MemoryController(#[from] V1MemoryControllerError),
    #[error(transparent)]
    PidsController(#[from] V1PidsControllerError),

    #[error("failed to collect stats: {}", describe_failures(.0))]
    Stats(Vec<(CtrlType, V1ManagerError)>),
}

fn describe_failures(failures: &[(CtrlType, V1ManagerError)]) -> String {
    let mut description = String::new();
    for (i, (subsystem, err)) in failures.iter().enumerate() {
        if i > 0 {
            description.push_str("; ");
        }
        let _ = write!(description, "{subsystem}: {err}");
    }
    description
}

/// Manages the cgroups of one container across all mounted v1 subsystems
#[derive(Debug)]
pub struct Manager {
    subsystems: HashMap<CtrlType, PathBuf>,
}

impl Manager {
    /// Constructs a new cgroup manager with cgroups_path being relative to the root of the subsystem.
    /// An empty path resolves to the cgroups the current process is a member of.
    pub fn new(cgroup_path: &Path) -> Result<Self, V1ManagerError> {
        let mount_points = util::list_supported_mount_points()?;
        let mut subsystems = HashMap::<CtrlType, PathBuf>::new();

        for subsystem in CONTROLLERS {
            let Some(mount_point) = mount_points.get(subsystem) else {
                tracing::warn!("cgroup {} not supported on this system", subsystem);
                continue;
            };

            let subsystem_path = Self::get_subsystem_path(mount_point, cgroup_path, subsystem)?;
            subsystems.insert(*subsystem, subsystem_path);
        }

        tracing::info!(?subsystems, "created cgroup v1 manager");
        Ok(Manager { subsystems })
    }

    /// Constructs a manager from already resolved subsystem directories
    pub fn with_paths(subsystems: HashMap<CtrlType, PathBuf>) -> Self {
        Manager { subsystems }
    }

    pub fn subsystems(&self) -> &HashMap<CtrlType, PathBuf> {
        &self.subsystems
    }

    fn get_subsystem_path(
        mount_point: &Path,
        cgroup_path: &Path,
        subsystem: &CtrlType,
    ) -> Result<PathBuf, V1ManagerError> {
        tracing::debug!("Get path for subsystem: {}", subsystem);
        let mount_point = mount_point.to_path_buf();
        if !cgroup_path.as_os_str().is_empty() {
            return Ok(mount_point.join_safely(cgroup_path)?);
        }

        let cgroup = Process::myself()?
            .cgroups()?
            .into_iter()
            .find(|c| c.controllers.iter().any(|name| name == subsystem.as_ref()))
            .ok_or(V1ManagerError::CGroupNotFound(*subsystem))?;

        Ok(mount_point.join_safely(Path::new(&cgroup.pathname))?)
    }

    /// Subsystems in application order, limited to the ones available on this system
    fn available(&self) -> impl Iterator<Item = (CtrlType, &PathBuf)> + '_ {
        CONTROLLERS
            .iter()
            .filter_map(|c| self.subsystems.get(c).map(|path| (*c, path)))
    }

    fn get_required_controllers(
        &self,
        resources: &Resources,
    ) -> Result<Vec<(CtrlType, &PathBuf)>, V1ManagerError> {
        let mut required_controllers = Vec::new();

        for controller in CONTROLLERS {
            let required = match controller {
                CtrlType::Cpu => Cpu::needs_to_handle(resources),
                CtrlType::CpuAcct => CpuAcct::needs_to_handle(resources),
                CtrlType::CpuSet => CpuSet::needs_to_handle(resources),
                CtrlType::Memory => Memory::needs_to_handle(resources),
                CtrlType::Pids => Pids::needs_to_handle(resources),
            };

            if required {
                let subsystem_path = self
                    .subsystems
                    .get(controller)
                    .ok_or(V1ManagerError::CGroupRequired(*controller))?;
                required_controllers.push((*controller, subsystem_path));
            }
        }

        Ok(required_controllers)
    }

    /// Visits every available subsystem. The sections of subsystems that could
    /// be read are filled in even if others fail.
    pub fn collect_stats(&self) -> (Stats, Vec<(CtrlType, V1ManagerError)>) {
        let mut stats = Stats::default();
        let mut failures = Vec::new();

        for (subsystem, path) in self.available() {
            if let Err(err) = Self::get_subsystem_stats(subsystem, path, &mut stats) {
                tracing::warn!("failed to collect {} stats: {}", subsystem, err);
                failures.push((subsystem, err));
            }
        }

        (stats, failures)
    }

    fn get_subsystem_stats(
        subsystem: CtrlType,
        path: &Path,
        stats: &mut Stats,
    ) -> Result<(), V1ManagerError> {
        match subsystem {
            CtrlType::Cpu => Cpu::get_stats(path, stats)?,
            CtrlType::CpuAcct => CpuAcct::get_stats(path, stats)?,
            CtrlType::CpuSet => CpuSet::get_stats(path, stats)?,
            CtrlType::Memory => Memory::get_stats(path, stats)?,
            CtrlType::Pids => Pids::get_stats(path, stats)?,
        }

        Ok(())
    }
}

impl CgroupManager for Manager {
    type Error = V1ManagerError;

    fn apply(&self, data: &CgroupData) -> Result<(), Self::Error> {
        self.get_required_controllers(data.resources)?;

        for (subsystem, path) in self.available() {
            tracing::debug!("apply {} cgroup for {}", subsystem, data.name);
            match subsystem {
                CtrlType::Cpu => Cpu::apply(path, data)?,
                CtrlType::CpuAcct => CpuAcct::apply(path, data)?,
                CtrlType::CpuSet => CpuSet::apply(path, data)?,
                CtrlType::Memory => Memory::apply(path, data)?,
                CtrlType::Pids => Pids::apply(path, data)?,
            }
        }

        Ok(())
    }

    fn set(&self, resources: &Resources) -> Result<(), Self::Error> {
        for (subsystem, path) in self.get_required_controllers(resources)? {
            match subsystem {
                CtrlType::Cpu => Cpu::set(path, resources)?,
                CtrlType::CpuAcct => CpuAcct::set(path, resources)?,
                CtrlType::CpuSet => CpuSet::set(path, resources)?,
                CtrlType::Memory => Memory::set(path, resources)?,
                CtrlType::Pids => Pids::set(path, resources)?,
            }
        }

        Ok(())
    }

    fn remove(&self) -> Result<(), Self::Error> {
        for (subsystem, path) in self.available() {
            if !path.exists() {
                continue;
            }

            tracing::debug!("remove cgroup {:?}", path);
            for pid in common::get_all_pids(path)? {
                if let Err(err) = signal::kill(pid, Signal::SIGKILL) {
                    tracing::debug!("failed to kill {}: {}", pid, err);
                }
            }

            match subsystem {
                CtrlType::Cpu => Cpu::remove(path)?,
                CtrlType::CpuAcct => CpuAcct::remove(path)?,
                CtrlType::CpuSet => CpuSet::remove(path)?,
                CtrlType::Memory => Memory::remove(path)?,
                CtrlType::Pids => Pids::remove(path)?,
            }
        }

        Ok(())
    }

    fn stats(&self) -> Result<Stats, Self::Error> {
        let (stats, failures) = self.collect_stats();
        if !failures.is_empty() {
            return Err(V1ManagerError::Stats(failures));
        }

        Ok(stats)
    }

    fn get_all_pids(&self) -> Result<Vec<Pid>, Self::Error> {
        let (_, path) = self
            .available()
            .next()
            .ok_or(V1ManagerError::SubsystemDoesNotExist)?;
        Ok(common::get_all_pids(path)?)
    }
}
