//! Control groups provide a way of controlling groups of processes.
//! This crate translates resource limits into writes against the cgroup v1
//! per-controller hierarchy and reads the same files back into statistics.
#[cfg(test)]
#[macro_use]
extern crate quickcheck;


pub mod common;
pub mod config;
pub mod stats;
pub mod v1;
