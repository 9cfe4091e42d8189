//! Controllers for the legacy cgroup v1 hierarchy, where every subsystem is
//! mounted separately and a container owns one directory per subsystem.
mod controller;
mod controller_type;
mod cpu;
mod cpuacct;
mod cpuset;
pub mod manager;
mod memory;
mod pids;
pub mod util;

pub use controller_type::{ControllerType, CONTROLLERS};
pub use cpu::V1CpuControllerError;
pub use cpuacct::V1CpuAcctStatsError;
pub use cpuset::V1CpuSetControllerError;
pub use manager::{Manager, V1ManagerError};
pub use memory::V1MemoryControllerError;
pub use pids::V1PidsControllerError;
