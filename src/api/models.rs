use std::collections::HashMap;

use crate::monitor::{
    ContainerStats, NodeStats, ProcessStats, ResourceUsageMap, Snapshot, VmStats, ZoneUsageMap,
};

/// Wire representation of one (entity, zone) energy entry.
#[derive(Debug, serde::Serialize)]
pub struct UsageBody {
    pub watts: f64,
    pub delta_joules: f64,
    pub total_joules: f64,
}

#[derive(Debug, serde::Serialize)]
pub struct ResourceBody {
    pub delta: f64,
    pub total: f64,
    pub rate: f64,
}

fn energy_body(zones: &ZoneUsageMap) -> HashMap<String, UsageBody> {
    zones
        .iter()
        .map(|(zone, usage)| {
            (
                zone.as_ref().to_owned(),
                UsageBody {
                    watts: usage.power.watts(),
                    delta_joules: usage.delta.joules(),
                    total_joules: usage.absolute.joules(),
                },
            )
        })
        .collect()
}

fn resource_body(resources: &ResourceUsageMap) -> HashMap<String, ResourceBody> {
    resources
        .iter()
        .map(|(kind, res)| {
            (
                kind.as_str().to_owned(),
                ResourceBody {
                    delta: res.delta,
                    total: res.absolute,
                    rate: res.rate,
                },
            )
        })
        .collect()
}

#[derive(Debug, serde::Serialize)]
pub struct NodeBody {
    pub cpu_time_delta: f64,
    pub energy: HashMap<String, UsageBody>,
    pub resources: HashMap<String, ResourceBody>,
}

impl From<&NodeStats> for NodeBody {
    fn from(node: &NodeStats) -> Self {
        Self {
            cpu_time_delta: node.cpu_time_delta,
            energy: energy_body(&node.energy),
            resources: resource_body(&node.resources),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ProcessBody {
    pub pid: i32,
    pub comm: String,
    pub exe: String,
    pub cpu_time_delta: f64,
    pub cpu_total_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_id: Option<String>,
    pub energy: HashMap<String, UsageBody>,
    pub resources: HashMap<String, ResourceBody>,
}

impl From<&ProcessStats> for ProcessBody {
    fn from(stats: &ProcessStats) -> Self {
        Self {
            pid: stats.pid,
            comm: stats.comm.clone(),
            exe: stats.exe.display().to_string(),
            cpu_time_delta: stats.cpu_time_delta,
            cpu_total_time: stats.cpu_total_time,
            container_id: stats.container_id.as_ref().map(|id| id.as_ref().to_owned()),
            vm_id: stats.vm_id.as_ref().map(|id| id.as_ref().to_owned()),
            energy: energy_body(&stats.energy),
            resources: resource_body(&stats.resources),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ContainerBody {
    pub id: String,
    pub name: String,
    pub runtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_id: Option<String>,
    pub cpu_time_delta: f64,
    pub cpu_total_time: f64,
    pub energy: HashMap<String, UsageBody>,
    pub resources: HashMap<String, ResourceBody>,
}

impl From<&ContainerStats> for ContainerBody {
    fn from(stats: &ContainerStats) -> Self {
        Self {
            id: stats.id.as_ref().to_owned(),
            name: stats.name.clone(),
            runtime: stats.runtime.as_str().to_owned(),
            pod_id: stats.pod_id.as_ref().map(|id| id.as_ref().to_owned()),
            cpu_time_delta: stats.cpu_time_delta,
            cpu_total_time: stats.cpu_total_time,
            energy: energy_body(&stats.energy),
            resources: resource_body(&stats.resources),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct VmBody {
    pub id: String,
    pub name: String,
    pub hypervisor: String,
    pub cpu_time_delta: f64,
    pub cpu_total_time: f64,
    pub energy: HashMap<String, UsageBody>,
    pub resources: HashMap<String, ResourceBody>,
}

impl From<&VmStats> for VmBody {
    fn from(stats: &VmStats) -> Self {
        Self {
            id: stats.id.as_ref().to_owned(),
            name: stats.name.clone(),
            hypervisor: stats.hypervisor.as_str().to_owned(),
            cpu_time_delta: stats.cpu_time_delta,
            cpu_total_time: stats.cpu_total_time,
            energy: energy_body(&stats.energy),
            resources: resource_body(&stats.resources),
        }
    }
}

/// Full body of `GET /snapshot`.
#[derive(Debug, serde::Serialize)]
pub struct SnapshotBody {
    pub timestamp: u64,
    pub node: NodeBody,
    pub processes: HashMap<i32, ProcessBody>,
    pub terminated_processes: HashMap<i32, ProcessBody>,
    pub containers: HashMap<String, ContainerBody>,
    pub terminated_containers: HashMap<String, ContainerBody>,
    pub virtual_machines: HashMap<String, VmBody>,
    pub terminated_vms: HashMap<String, VmBody>,
}

impl From<&Snapshot> for SnapshotBody {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp,
            node: NodeBody::from(&snapshot.node),
            processes: snapshot
                .processes
                .iter()
                .map(|(pid, stats)| (*pid, ProcessBody::from(stats)))
                .collect(),
            terminated_processes: snapshot
                .terminated_processes
                .iter()
                .map(|(pid, stats)| (*pid, ProcessBody::from(stats)))
                .collect(),
            containers: snapshot
                .containers
                .iter()
                .map(|(id, stats)| (id.as_ref().to_owned(), ContainerBody::from(stats)))
                .collect(),
            terminated_containers: snapshot
                .terminated_containers
                .iter()
                .map(|(id, stats)| (id.as_ref().to_owned(), ContainerBody::from(stats)))
                .collect(),
            virtual_machines: snapshot
                .virtual_machines
                .iter()
                .map(|(id, stats)| (id.as_ref().to_owned(), VmBody::from(stats)))
                .collect(),
            terminated_vms: snapshot
                .terminated_vms
                .iter()
                .map(|(id, stats)| (id.as_ref().to_owned(), VmBody::from(stats)))
                .collect(),
        }
    }
}
