//! Externally visible per-entity stats, maintained by the collector.

use std::path::PathBuf;

use crate::resource::{
    Container, ContainerID, ContainerRuntime, Hypervisor, Pid, PodID, Process, VirtualMachine,
    VmID,
};

use super::usage::{ResourceUsageMap, ZoneUsageMap};

/// Node-wide rollup. Energy comes straight from the meter; resources are
/// the bottom-up sum over all tracked processes.
#[derive(Debug, Clone, Default)]
pub struct NodeStats {
    pub energy: ZoneUsageMap,
    pub resources: ResourceUsageMap,
    /// Apportionment denominator of the last cycle, in seconds.
    pub cpu_time_delta: f64,
}

impl NodeStats {
    pub fn reset_delta_values(&mut self) {
        self.cpu_time_delta = 0.0;
        for usage in self.energy.values_mut() {
            usage.reset_delta();
        }
        for res in self.resources.values_mut() {
            res.reset_delta();
        }
    }
}

/// Per-process stats entry.
#[derive(Debug, Clone)]
pub struct ProcessStats {
    pub pid: Pid,
    pub comm: String,
    pub exe: PathBuf,
    pub start_time_ticks: u64,
    pub cpu_total_time: f64,
    pub cpu_time_delta: f64,
    /// Set when the process belongs to a container; mutually exclusive
    /// with `vm_id`.
    pub container_id: Option<ContainerID>,
    pub vm_id: Option<VmID>,
    pub kernel_thread: bool,
    /// Consecutive cycles this process was missing from the fresh process
    /// table. Non-zero entries are liveness-checked before eviction.
    pub idle_counter: u32,
    pub energy: ZoneUsageMap,
    pub resources: ResourceUsageMap,
}

impl ProcessStats {
    pub fn new(proc: &Process) -> Self {
        Self {
            pid: proc.pid,
            comm: proc.comm.clone(),
            exe: proc.exe.clone(),
            start_time_ticks: proc.start_time_ticks,
            cpu_total_time: proc.cpu_total_time,
            cpu_time_delta: proc.cpu_time_delta,
            container_id: proc.ownership.container().map(|c| c.id.clone()),
            vm_id: proc.ownership.vm().map(|vm| vm.id.clone()),
            kernel_thread: proc.is_kernel_thread(),
            idle_counter: 0,
            energy: ZoneUsageMap::default(),
            resources: ResourceUsageMap::default(),
        }
    }

    pub fn reset_delta_values(&mut self) {
        self.cpu_time_delta = 0.0;
        for usage in self.energy.values_mut() {
            usage.reset_delta();
        }
        for res in self.resources.values_mut() {
            res.reset_delta();
        }
    }

}

/// Per-container stats entry.
#[derive(Debug, Clone)]
pub struct ContainerStats {
    pub id: ContainerID,
    pub name: String,
    pub runtime: ContainerRuntime,
    pub pod_id: Option<PodID>,
    pub cpu_total_time: f64,
    pub cpu_time_delta: f64,
    pub energy: ZoneUsageMap,
    pub resources: ResourceUsageMap,
}

impl ContainerStats {
    pub fn new(container: &Container) -> Self {
        Self {
            id: container.id.clone(),
            name: container.name.clone(),
            runtime: container.runtime,
            pod_id: container.pod_id.clone(),
            cpu_total_time: 0.0,
            cpu_time_delta: 0.0,
            energy: ZoneUsageMap::default(),
            resources: ResourceUsageMap::default(),
        }
    }

    /// Entry for one of the reserved aggregate pseudo-containers.
    pub fn pseudo(id: ContainerID) -> Self {
        let name = id.as_ref().to_owned();
        Self {
            id,
            name,
            runtime: ContainerRuntime::Unknown,
            pod_id: None,
            cpu_total_time: 0.0,
            cpu_time_delta: 0.0,
            energy: ZoneUsageMap::default(),
            resources: ResourceUsageMap::default(),
        }
    }

    pub fn reset_delta_values(&mut self) {
        self.cpu_time_delta = 0.0;
        for usage in self.energy.values_mut() {
            usage.reset_delta();
        }
        for res in self.resources.values_mut() {
            res.reset_delta();
        }
    }
}

/// Per-virtual-machine stats entry.
#[derive(Debug, Clone)]
pub struct VmStats {
    pub id: VmID,
    pub name: String,
    pub hypervisor: Hypervisor,
    pub cpu_total_time: f64,
    pub cpu_time_delta: f64,
    pub energy: ZoneUsageMap,
    pub resources: ResourceUsageMap,
}

impl VmStats {
    pub fn new(vm: &VirtualMachine) -> Self {
        Self {
            id: vm.id.clone(),
            name: vm.name.clone(),
            hypervisor: vm.hypervisor,
            cpu_total_time: 0.0,
            cpu_time_delta: 0.0,
            energy: ZoneUsageMap::default(),
            resources: ResourceUsageMap::default(),
        }
    }

    pub fn reset_delta_values(&mut self) {
        self.cpu_time_delta = 0.0;
        for usage in self.energy.values_mut() {
            usage.reset_delta();
        }
        for res in self.resources.values_mut() {
            res.reset_delta();
        }
    }
}
