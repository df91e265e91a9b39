//! Energy aggregation, eviction, and power attribution.
//!
//! Consumes the resource informer's per-cycle view together with the
//! energy meter's zone readings, and maintains the externally visible
//! node/process/container/VM power statistics.
//!
//! # Key Components
//!
//! - [`Collector`] — per-cycle aggregation and bounded-memory eviction.
//! - [`apportion`] — the CPU-time-ratio apportionment algorithm shared by
//!   the container/VM layer and the default process estimator.
//! - [`Snapshot`] / [`SnapshotStore`] — atomically published cycle results.

mod attribution;
mod collector;
mod estimator;
mod snapshot;
mod stats;
mod usage;

pub use attribution::{Share, apportion};
pub use collector::{
    Collector, KERNEL_CONTAINER_ID, MAX_INACTIVE_CONTAINERS, MAX_INACTIVE_VMS,
    SYSTEM_CONTAINER_ID,
};
pub use estimator::{CpuRatioEstimator, ProcessEnergyEstimator};
pub use snapshot::{Snapshot, SnapshotStore};
pub use stats::{ContainerStats, NodeStats, ProcessStats, VmStats};
pub use usage::{
    Energy, Power, ResourceKind, ResourceUsage, ResourceUsageMap, Usage, Zone, ZoneUsageMap,
};
