//! Discovery and caching of processes, containers, and virtual machines.
//!
//! This module maintains the node's resource inventory over time. Each
//! refresh cycle it diffs the process table against per-PID, per-container,
//! and per-VM caches, classifies newly seen processes by ownership
//! (container vs. VM, decided by two concurrent lookups), and publishes
//! Running/Terminated sets together with the node-wide CPU-time delta used
//! as the power apportionment denominator.
//!
//! # Key Components
//!
//! - [`Informer`] — owns the caches and performs the per-cycle refresh.
//! - [`ProcReader`] / [`ProcHandle`] — process-table access, backed by
//!   procfs in production and by scripted tables in tests.
//! - [`OwnershipLookup`] — container/VM classification contract.
//! - [`ProcessLiveness`] / [`ContainerLiveness`] — existence oracles used
//!   by the eviction passes downstream.

mod classify;
mod error;
mod informer;
mod procfs;
mod types;

pub use classify::{
    CgroupLiveContainers, ContainerLiveness, OwnershipLookup, ProcfsOwnershipLookup,
    parse_cgroup_path,
};
pub use error::{Error, ErrorList, Result};
pub use informer::Informer;
pub use procfs::{ProcFsReader, ProcHandle, ProcReader, ProcessLiveness, SignalLiveness};
pub use types::{
    Container, ContainerID, ContainerInfo, ContainerRuntime, ContainersView, Hypervisor,
    Ownership, Pid, PodID, Process, ProcessesView, VirtualMachine, VirtualMachinesView, VmID,
    VmInfo,
};
