//! Process-level energy estimation.
//!
//! The collector does not compute process energy itself; it consumes this
//! collaborator contract. The default estimator apportions the node's
//! measured zone energy by CPU-time ratio, the same algorithm used for
//! containers and VMs.

use super::attribution::{Share, apportion};
use super::usage::{Zone, ZoneUsageMap};

/// Produces one process's per-zone energy for the elapsed cycle.
pub trait ProcessEnergyEstimator: Send + Sync {
    fn estimate(
        &self,
        node_zones: &ZoneUsageMap,
        node_cpu_time_delta: f64,
        cpu_time_delta: f64,
    ) -> Vec<(Zone, Share)>;
}

/// Default estimator: a process is charged each zone in proportion to its
/// share of the node CPU-time delta.
#[derive(Debug, Default)]
pub struct CpuRatioEstimator;

impl ProcessEnergyEstimator for CpuRatioEstimator {
    fn estimate(
        &self,
        node_zones: &ZoneUsageMap,
        node_cpu_time_delta: f64,
        cpu_time_delta: f64,
    ) -> Vec<(Zone, Share)> {
        node_zones
            .iter()
            .map(|(zone, usage)| {
                (
                    zone.clone(),
                    apportion(usage, node_cpu_time_delta, cpu_time_delta),
                )
            })
            .collect()
    }
}
