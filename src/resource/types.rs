use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::{Error, Result};

/// OS-assigned process identifier. PIDs may be reused by the kernel after a
/// process exits; reuse is detected via the process start time.
pub type Pid = i32;

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// A validated container identifier as assigned by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the length of the input
    /// exceeds [`CONTAINER_ID_MAX_LEN`].
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > CONTAINER_ID_MAX_LEN {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// Short form used as a human-readable fallback name.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A Kubernetes pod UID extracted from a kubepods cgroup slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodID(Arc<str>);

impl PodID {
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > CONTAINER_ID_MAX_LEN {
            return Err(Error::InvalidPodID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }
}

impl AsRef<str> for PodID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PodID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A virtual machine identifier as reported by the hypervisor process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VmID(Arc<str>);

impl VmID {
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > CONTAINER_ID_MAX_LEN {
            return Err(Error::InvalidVmID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }
}

impl AsRef<str> for VmID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for VmID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VmID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Container runtime inferred from the cgroup naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    Docker,
    Containerd,
    Crio,
    Podman,
    Unknown,
}

impl ContainerRuntime {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Containerd => "containerd",
            ContainerRuntime::Crio => "crio",
            ContainerRuntime::Podman => "podman",
            ContainerRuntime::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hypervisor inferred from the VM process executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hypervisor {
    Qemu,
    CloudHypervisor,
    Firecracker,
}

impl Hypervisor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hypervisor::Qemu => "qemu",
            Hypervisor::CloudHypervisor => "cloud-hypervisor",
            Hypervisor::Firecracker => "firecracker",
        }
    }
}

impl fmt::Display for Hypervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container identity attached to a process by the ownership classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: ContainerID,
    pub name: String,
    pub runtime: ContainerRuntime,
    pub cgroup_path: String,
    pub pod_id: Option<PodID>,
}

/// Virtual machine identity attached to a process by the ownership classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmInfo {
    pub id: VmID,
    pub name: String,
    pub hypervisor: Hypervisor,
}

/// Who a process belongs to.
///
/// Starts as `Unknown` and transitions exactly once to one of the other
/// variants; classification is never re-run for a process once it succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Ownership {
    #[default]
    Unknown,
    Regular,
    Container(ContainerInfo),
    VirtualMachine(VmInfo),
}

impl Ownership {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Ownership::Unknown)
    }

    pub fn container(&self) -> Option<&ContainerInfo> {
        match self {
            Ownership::Container(info) => Some(info),
            _ => None,
        }
    }

    pub fn vm(&self) -> Option<&VmInfo> {
        match self {
            Ownership::VirtualMachine(info) => Some(info),
            _ => None,
        }
    }
}

/// A tracked OS process.
#[derive(Debug, Clone, Default)]
pub struct Process {
    pub pid: Pid,
    pub comm: String,
    /// Resolved executable path. Empty for kernel threads.
    pub exe: PathBuf,
    /// Kernel start time in clock ticks, used to detect PID reuse.
    pub start_time_ticks: u64,
    /// Cumulative CPU time in seconds.
    pub cpu_total_time: f64,
    /// CPU time accrued since the previous refresh, in seconds.
    pub cpu_time_delta: f64,
    pub ownership: Ownership,
}

impl Process {
    /// A process whose identity fields were resolved at least once.
    pub fn is_populated(&self) -> bool {
        !self.comm.is_empty()
    }

    /// Kernel threads have no userspace executable.
    pub fn is_kernel_thread(&self) -> bool {
        self.is_populated() && self.exe.as_os_str().is_empty()
    }
}

/// A tracked container, aggregating the CPU time of its member processes.
#[derive(Debug, Clone)]
pub struct Container {
    pub id: ContainerID,
    pub name: String,
    pub runtime: ContainerRuntime,
    pub cgroup_path: String,
    pub pod_id: Option<PodID>,
    /// Cumulative CPU time of member processes, in seconds.
    pub cpu_total_time: f64,
    /// CPU time of member processes accrued this cycle, in seconds.
    pub cpu_time_delta: f64,
}

impl Container {
    pub fn from_info(info: &ContainerInfo) -> Self {
        Self {
            id: info.id.clone(),
            name: info.name.clone(),
            runtime: info.runtime,
            cgroup_path: info.cgroup_path.clone(),
            pod_id: info.pod_id.clone(),
            cpu_total_time: 0.0,
            cpu_time_delta: 0.0,
        }
    }
}

/// A tracked virtual machine.
#[derive(Debug, Clone)]
pub struct VirtualMachine {
    pub id: VmID,
    pub name: String,
    pub hypervisor: Hypervisor,
    pub cpu_total_time: f64,
    pub cpu_time_delta: f64,
}

impl VirtualMachine {
    pub fn from_info(info: &VmInfo) -> Self {
        Self {
            id: info.id.clone(),
            name: info.name.clone(),
            hypervisor: info.hypervisor,
            cpu_total_time: 0.0,
            cpu_time_delta: 0.0,
        }
    }
}

/// Running and terminated processes as of the last refresh.
#[derive(Debug)]
pub struct ProcessesView<'a> {
    /// Sum of CPU-time deltas of previously-known processes that are still
    /// running. Used as the apportionment denominator. Brand-new processes
    /// are excluded until they have a baseline.
    pub node_cpu_time_delta: f64,
    pub running: &'a HashMap<Pid, Process>,
    pub terminated: &'a HashMap<Pid, Process>,
}

/// Running and terminated containers as of the last refresh.
#[derive(Debug)]
pub struct ContainersView<'a> {
    pub node_cpu_time_delta: f64,
    pub running: &'a HashMap<ContainerID, Container>,
    pub terminated: &'a HashMap<ContainerID, Container>,
}

/// Running and terminated virtual machines as of the last refresh.
#[derive(Debug)]
pub struct VirtualMachinesView<'a> {
    pub node_cpu_time_delta: f64,
    pub running: &'a HashMap<VmID, VirtualMachine>,
    pub terminated: &'a HashMap<VmID, VirtualMachine>,
}
