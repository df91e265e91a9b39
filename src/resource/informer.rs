//! Incremental process/container/VM discovery.
//!
//! The informer owns the per-PID, per-container, and per-VM caches and
//! refreshes them once per cycle from the process table. Each refresh
//! produces consistent Running and Terminated sets plus the node-wide
//! CPU-time delta used downstream as the apportionment denominator.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use std::time::Instant;

use super::classify::OwnershipLookup;
use super::procfs::{ProcHandle, ProcReader};
use super::types::{
    Container, ContainerID, ContainersView, Ownership, Pid, Process, ProcessesView,
    VirtualMachine, VirtualMachinesView, VmID,
};
use super::{Error, ErrorList};

/// CPU-time deltas at or below this are treated as "no activity" and skip
/// the identity re-resolution syscalls.
const NEGLIGIBLE_CPU_DELTA: f64 = 1e-12;

pub struct Informer {
    reader: Box<dyn ProcReader>,
    lookup: Arc<dyn OwnershipLookup>,

    proc_cache: HashMap<Pid, Process>,
    container_cache: HashMap<ContainerID, Container>,
    vm_cache: HashMap<VmID, VirtualMachine>,

    terminated_procs: HashMap<Pid, Process>,
    terminated_containers: HashMap<ContainerID, Container>,
    terminated_vms: HashMap<VmID, VirtualMachine>,

    node_cpu_time_delta: f64,
}

impl Informer {
    pub fn new(reader: Box<dyn ProcReader>, lookup: Arc<dyn OwnershipLookup>) -> Self {
        Self {
            reader,
            lookup,
            proc_cache: HashMap::new(),
            container_cache: HashMap::new(),
            vm_cache: HashMap::new(),
            terminated_procs: HashMap::new(),
            terminated_containers: HashMap::new(),
            terminated_vms: HashMap::new(),
            node_cpu_time_delta: 0.0,
        }
    }

    /// Verifies the process table is accessible at all.
    pub fn init(&self) -> Result<(), Error> {
        self.reader.all_procs().map_err(Error::ProcTable)?;
        Ok(())
    }

    /// Running and terminated processes as of the last [`refresh`].
    ///
    /// [`refresh`]: Informer::refresh
    pub fn processes(&self) -> ProcessesView<'_> {
        ProcessesView {
            node_cpu_time_delta: self.node_cpu_time_delta,
            running: &self.proc_cache,
            terminated: &self.terminated_procs,
        }
    }

    pub fn containers(&self) -> ContainersView<'_> {
        ContainersView {
            node_cpu_time_delta: self.node_cpu_time_delta,
            running: &self.container_cache,
            terminated: &self.terminated_containers,
        }
    }

    pub fn virtual_machines(&self) -> VirtualMachinesView<'_> {
        VirtualMachinesView {
            node_cpu_time_delta: self.node_cpu_time_delta,
            running: &self.vm_cache,
            terminated: &self.terminated_vms,
        }
    }

    /// Scans the process table and updates all caches.
    ///
    /// A process that cannot be read because it exited mid-scan is skipped
    /// silently; every other per-process failure is recorded and surfaced
    /// together after the cycle completed for the remaining processes.
    pub async fn refresh(&mut self) -> Result<(), ErrorList> {
        let started = Instant::now();
        let mut errs = ErrorList::default();

        let procs = match self.reader.all_procs() {
            Ok(procs) => procs,
            Err(err) => {
                errs.push(Error::ProcTable(err));
                return errs.into_result();
            }
        };

        let mut seen_procs: HashSet<Pid> = HashSet::with_capacity(procs.len());
        let mut seen_containers: HashSet<ContainerID> = HashSet::new();
        let mut seen_vms: HashSet<VmID> = HashSet::new();
        let mut resurrected: Vec<Process> = Vec::new();
        let mut node_cpu_time_delta = 0.0;

        for handle in &procs {
            let pid = handle.pid();
            let had_baseline = match self.update_process(handle.as_ref(), &mut resurrected) {
                Ok(had_baseline) => had_baseline,
                Err(err) => {
                    if is_not_found(&err) {
                        log::debug!("process {pid} vanished mid-scan");
                    } else {
                        errs.push(err);
                    }
                    continue;
                }
            };

            seen_procs.insert(pid);
            let entry = &self.proc_cache[&pid];
            if had_baseline {
                // only previously-known processes feed the apportionment
                // denominator; new ones wait one cycle for a baseline
                node_cpu_time_delta += entry.cpu_time_delta;
            }

            if entry.ownership.is_unknown() {
                let ownership = match self.classify(pid).await {
                    Ok(ownership) => ownership,
                    Err(classify_errs) => {
                        for err in classify_errs {
                            if !is_not_found(&err) {
                                errs.push(err);
                            }
                        }
                        // left Unknown, retried next cycle
                        continue;
                    }
                };
                if let Some(entry) = self.proc_cache.get_mut(&pid) {
                    entry.ownership = ownership;
                }
            }

            let entry = &self.proc_cache[&pid];
            let delta = entry.cpu_time_delta;
            match entry.ownership.clone() {
                Ownership::Container(info) => {
                    let cached = self
                        .container_cache
                        .entry(info.id.clone())
                        .or_insert_with(|| Container::from_info(&info));
                    // reset once per cycle so the delta reflects only the
                    // current membership, however much it churned
                    if seen_containers.insert(info.id.clone()) {
                        cached.cpu_time_delta = 0.0;
                    }
                    cached.cpu_time_delta += delta;
                    cached.cpu_total_time += delta;
                }
                Ownership::VirtualMachine(info) => {
                    let cached = self
                        .vm_cache
                        .entry(info.id.clone())
                        .or_insert_with(|| VirtualMachine::from_info(&info));
                    if seen_vms.insert(info.id.clone()) {
                        cached.cpu_time_delta = 0.0;
                    }
                    cached.cpu_time_delta += delta;
                    cached.cpu_total_time += delta;
                }
                Ownership::Regular | Ownership::Unknown => {}
            }
        }

        // anything cached but not seen this cycle has terminated
        let mut terminated_procs: HashMap<Pid, Process> = HashMap::new();
        let gone: Vec<Pid> = self
            .proc_cache
            .keys()
            .filter(|pid| !seen_procs.contains(*pid))
            .copied()
            .collect();
        for pid in gone {
            if let Some(proc) = self.proc_cache.remove(&pid) {
                terminated_procs.insert(pid, proc);
            }
        }
        for proc in resurrected {
            terminated_procs.insert(proc.pid, proc);
        }

        let mut terminated_containers: HashMap<ContainerID, Container> = HashMap::new();
        let gone: Vec<ContainerID> = self
            .container_cache
            .keys()
            .filter(|id| !seen_containers.contains(*id))
            .cloned()
            .collect();
        for id in gone {
            if let Some(container) = self.container_cache.remove(&id) {
                terminated_containers.insert(id, container);
            }
        }

        let mut terminated_vms: HashMap<VmID, VirtualMachine> = HashMap::new();
        let gone: Vec<VmID> = self
            .vm_cache
            .keys()
            .filter(|id| !seen_vms.contains(*id))
            .cloned()
            .collect();
        for id in gone {
            if let Some(vm) = self.vm_cache.remove(&id) {
                terminated_vms.insert(id, vm);
            }
        }

        self.terminated_procs = terminated_procs;
        self.terminated_containers = terminated_containers;
        self.terminated_vms = terminated_vms;
        self.node_cpu_time_delta = node_cpu_time_delta;

        log::debug!(
            "refresh: running={} terminated={} containers={} vms={} errors={}",
            self.proc_cache.len(),
            self.terminated_procs.len(),
            self.container_cache.len(),
            self.vm_cache.len(),
            errs.len(),
        );
        log::trace!("refresh() took {}ns", started.elapsed().as_nanos());

        errs.into_result()
    }

    /// Creates or updates the cache entry for one enumerated process.
    ///
    /// Returns whether the process already had a CPU-time baseline from a
    /// previous cycle. A cached PID whose kernel start time changed is a
    /// reused PID: the stale entry is retired and a fresh one created.
    fn update_process(
        &mut self,
        proc: &dyn ProcHandle,
        resurrected: &mut Vec<Process>,
    ) -> Result<bool, Error> {
        let pid = proc.pid();
        let read = |source: io::Error| Error::ProcRead { pid, source };

        let cpu_total_time = proc.cpu_time().map_err(read)?;
        let start_time_ticks = proc.start_time_ticks().map_err(read)?;

        if let Some(cached) = self.proc_cache.get_mut(&pid) {
            if cached.start_time_ticks == start_time_ticks {
                cached.cpu_time_delta = cpu_total_time - cached.cpu_total_time;
                cached.cpu_total_time = cpu_total_time;

                // ignore identity refresh for entries with no measurable
                // activity since the last cycle
                if cached.is_populated() && cached.cpu_time_delta <= NEGLIGIBLE_CPU_DELTA {
                    return Ok(true);
                }

                cached.comm = proc.comm().map_err(read)?;
                cached.exe = proc.executable().map_err(read)?;
                return Ok(true);
            }

            log::debug!("pid {pid} was reused, retiring stale entry");
            if let Some(stale) = self.proc_cache.remove(&pid) {
                resurrected.push(stale);
            }
        }

        let mut entry = Process {
            pid,
            start_time_ticks,
            cpu_total_time,
            cpu_time_delta: cpu_total_time,
            ..Process::default()
        };
        entry.comm = proc.comm().map_err(read)?;
        entry.exe = proc.executable().map_err(read)?;
        self.proc_cache.insert(pid, entry);

        Ok(false)
    }

    /// Runs the container and VM lookups concurrently and joins the results.
    ///
    /// The two lookups are redundant, mutually exclusive checks against
    /// different subsystems. A positive container result wins over any VM
    /// result; a process neither lookup claims is regular. When both
    /// lookups fail their errors are surfaced together.
    async fn classify(&self, pid: Pid) -> Result<Ownership, Vec<Error>> {
        let container_lookup = Arc::clone(&self.lookup);
        let vm_lookup = Arc::clone(&self.lookup);

        let (container_res, vm_res) = tokio::join!(
            tokio::task::spawn_blocking(move || container_lookup.container_of(pid)),
            tokio::task::spawn_blocking(move || vm_lookup.vm_of(pid)),
        );

        let container = match container_res {
            Ok(Ok(found)) => Ok(found),
            Ok(Err(source)) => Err(Error::ContainerLookup { pid, source }),
            Err(_) => Err(Error::ClassifyAborted(pid)),
        };
        let vm = match vm_res {
            Ok(Ok(found)) => Ok(found),
            Ok(Err(source)) => Err(Error::VmLookup { pid, source }),
            Err(_) => Err(Error::ClassifyAborted(pid)),
        };

        match (container, vm) {
            (Ok(Some(info)), _) => Ok(Ownership::Container(info)),
            (_, Ok(Some(info))) => Ok(Ownership::VirtualMachine(info)),
            (Ok(None), Ok(None)) => Ok(Ownership::Regular),
            (Err(err), Ok(None)) | (Ok(None), Err(err)) => Err(vec![err]),
            (Err(container_err), Err(vm_err)) => Err(vec![container_err, vm_err]),
        }
    }
}

fn is_not_found(err: &Error) -> bool {
    let source = match err {
        Error::ProcRead { source, .. } => source,
        Error::ContainerLookup { source, .. } => source,
        Error::VmLookup { source, .. } => source,
        _ => return false,
    };
    source.kind() == io::ErrorKind::NotFound
}
