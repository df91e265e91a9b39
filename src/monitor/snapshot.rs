//! Published per-cycle snapshots.
//!
//! The driver finishes a full cycle, builds one [`Snapshot`], and swaps it
//! into the [`SnapshotStore`]. Exporters only ever observe completed
//! cycles; the lock is held for the duration of an `Arc` swap, never for
//! the aggregation itself.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::resource::{ContainerID, ContainersView, Pid, ProcessesView, VirtualMachinesView, VmID};

use super::collector::Collector;
use super::stats::{ContainerStats, NodeStats, ProcessStats, VmStats};

/// A consistent, read-only view of one finished cycle.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Seconds since the UNIX epoch at the end of the cycle.
    pub timestamp: u64,
    pub node: NodeStats,
    pub processes: HashMap<Pid, ProcessStats>,
    pub terminated_processes: HashMap<Pid, ProcessStats>,
    pub containers: HashMap<ContainerID, ContainerStats>,
    pub terminated_containers: HashMap<ContainerID, ContainerStats>,
    pub virtual_machines: HashMap<VmID, VmStats>,
    pub terminated_vms: HashMap<VmID, VmStats>,
}

impl Snapshot {
    /// Captures the collector's state at the end of a cycle. Terminated
    /// entities keep the stats they had accumulated while running.
    pub fn capture(
        timestamp: u64,
        collector: &Collector,
        procs: &ProcessesView<'_>,
        containers: &ContainersView<'_>,
        vms: &VirtualMachinesView<'_>,
    ) -> Self {
        let terminated_processes = procs
            .terminated
            .keys()
            .filter_map(|pid| {
                collector
                    .processes()
                    .get(pid)
                    .map(|stats| (*pid, stats.clone()))
            })
            .collect();
        let terminated_containers = containers
            .terminated
            .keys()
            .filter_map(|id| {
                collector
                    .containers()
                    .get(id)
                    .map(|stats| (id.clone(), stats.clone()))
            })
            .collect();
        let terminated_vms = vms
            .terminated
            .keys()
            .filter_map(|id| {
                collector.vms().get(id).map(|stats| (id.clone(), stats.clone()))
            })
            .collect();

        Self {
            timestamp,
            node: collector.node().clone(),
            processes: collector.processes().clone(),
            terminated_processes,
            containers: collector.containers().clone(),
            terminated_containers,
            virtual_machines: collector.vms().clone(),
            terminated_vms,
        }
    }
}

/// Shared handle exporters read the latest snapshot through.
///
/// Readers get an `Arc` to a finished snapshot and never block the next
/// cycle; the writer replaces the `Arc` under a short write lock.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: Snapshot) {
        let mut slot = self.inner.write().expect("snapshot lock poisoned");
        *slot = Arc::new(snapshot);
    }

    pub fn latest(&self) -> Arc<Snapshot> {
        Arc::clone(&self.inner.read().expect("snapshot lock poisoned"))
    }
}
