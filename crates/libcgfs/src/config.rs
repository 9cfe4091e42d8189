use nix::unistd::Pid;
use oci_spec::runtime::LinuxResources;
use serde::{Deserialize, Serialize};

/// Resources holds the desired resource limits of a container across all
/// controllers. A numeric field left at zero (or an empty string) means that
/// the corresponding cgroup file is not touched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Resources {
    /// Relative cpu weight (cpu.shares)
    pub cpu_shares: u64,
    /// Cpu time in microseconds a cgroup may consume per period (cpu.cfs_quota_us)
    pub cpu_quota: i64,
    /// Length of a CFS period in microseconds (cpu.cfs_period_us)
    pub cpu_period: u64,
    /// Realtime runtime in microseconds per realtime period (cpu.rt_runtime_us)
    pub cpu_rt_runtime: i64,
    /// Length of a realtime period in microseconds (cpu.rt_period_us)
    pub cpu_rt_period: u64,
    /// Cpus the tasks may run on, e.g. "0-3,6"
    pub cpuset_cpus: String,
    /// Memory nodes the tasks may allocate from
    pub cpuset_mems: String,
    /// Memory limit in bytes, -1 for unlimited
    pub memory: i64,
    /// Soft memory limit in bytes
    pub memory_reservation: i64,
    /// Memory plus swap limit in bytes, -1 for unlimited
    pub memory_swap: i64,
    /// Tendency to swap out anonymous pages (0-100)
    pub memory_swappiness: Option<u64>,
    /// Disables the OOM killer for out of memory conditions
    pub oom_kill_disable: bool,
    /// Maximum number of tasks, values <= 0 mean unlimited
    pub pids_limit: i64,
}

impl From<&LinuxResources> for Resources {
    fn from(linux_resources: &LinuxResources) -> Self {
        let mut resources = Resources::default();

        if let Some(cpu) = linux_resources.cpu() {
            resources.cpu_shares = cpu.shares().unwrap_or(0);
            resources.cpu_quota = cpu.quota().unwrap_or(0);
            resources.cpu_period = cpu.period().unwrap_or(0);
            resources.cpu_rt_runtime = cpu.realtime_runtime().unwrap_or(0);
            resources.cpu_rt_period = cpu.realtime_period().unwrap_or(0);
            if let Some(cpus) = cpu.cpus() {
                resources.cpuset_cpus = cpus.to_owned();
            }
            if let Some(mems) = cpu.mems() {
                resources.cpuset_mems = mems.to_owned();
            }
        }

        if let Some(memory) = linux_resources.memory() {
            resources.memory = memory.limit().unwrap_or(0);
            resources.memory_reservation = memory.reservation().unwrap_or(0);
            resources.memory_swap = memory.swap().unwrap_or(0);
            resources.memory_swappiness = memory.swappiness();
            resources.oom_kill_disable = matches!(memory.disable_oom_killer(), Some(true));
        }

        if let Some(pids) = linux_resources.pids() {
            resources.pids_limit = pids.limit();
        }

        resources
    }
}

/// CgroupData joins the resources of a container with the task that is
/// moved into its cgroups. It only lives for the duration of one apply.
#[derive(Clone, Debug)]
pub struct CgroupData<'a> {
    /// Resource limits that have to be in place when the task joins
    pub resources: &'a Resources,
    /// Task to move into the cgroup, -1 creates the cgroup without joining
    pub pid: Pid,
    /// Name of the container the cgroup belongs to
    pub name: String,
}

impl<'a> CgroupData<'a> {
    pub fn new<S: Into<String>>(resources: &'a Resources, pid: Pid, name: S) -> Self {
        Self {
            resources,
            pid,
            name: name.into(),
        }
    }
}
