//! Aggregation and eviction of per-entity power statistics.
//!
//! The collector turns the informer's process-level view plus the meter's
//! zone readings into process/container/VM/node rollups, and keeps the
//! live entity set bounded by evicting processes confirmed dead and
//! containers/VMs idle beyond a hysteresis threshold.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use crate::power::ZoneReading;
use crate::resource::{
    ContainerID, ContainerLiveness, ContainersView, Pid, ProcessLiveness, ProcessesView,
    VirtualMachinesView, VmID,
};

use super::attribution::apportion;
use super::estimator::ProcessEnergyEstimator;
use super::stats::{ContainerStats, NodeStats, ProcessStats, VmStats};
use super::usage::{ResourceKind, Zone};

/// Container eviction only runs once this many containers are
/// simultaneously inactive, to amortize the cost of the live-container
/// oracle query.
pub const MAX_INACTIVE_CONTAINERS: usize = 10;

/// VM eviction threshold. Smaller than the container one since there is no
/// external oracle to consult and VMs churn far less.
pub const MAX_INACTIVE_VMS: usize = 3;

/// Pseudo-container aggregating regular (non-containerized) processes.
pub const SYSTEM_CONTAINER_ID: &str = "system_processes";

/// Pseudo-container aggregating kernel threads.
pub const KERNEL_CONTAINER_ID: &str = "kernel_processes";

fn is_reserved(id: &ContainerID) -> bool {
    id.as_ref() == SYSTEM_CONTAINER_ID || id.as_ref() == KERNEL_CONTAINER_ID
}

pub struct Collector {
    node: NodeStats,
    processes: HashMap<Pid, ProcessStats>,
    containers: HashMap<ContainerID, ContainerStats>,
    vms: HashMap<VmID, VmStats>,

    liveness: Arc<dyn ProcessLiveness>,
    container_oracle: Arc<dyn ContainerLiveness>,
    estimator: Box<dyn ProcessEnergyEstimator>,

    container_stats_enabled: bool,
    vm_stats_enabled: bool,

    /// Lifetime energy of evicted processes, folded in at deletion time
    /// when debug logging is on. Shared with diagnostic readers.
    retired_energy: Arc<DashMap<Zone, f64>>,
}

impl Collector {
    pub fn new(
        liveness: Arc<dyn ProcessLiveness>,
        container_oracle: Arc<dyn ContainerLiveness>,
        estimator: Box<dyn ProcessEnergyEstimator>,
        container_stats_enabled: bool,
        vm_stats_enabled: bool,
    ) -> Self {
        Self {
            node: NodeStats::default(),
            processes: HashMap::new(),
            containers: HashMap::new(),
            vms: HashMap::new(),
            liveness,
            container_oracle,
            estimator,
            container_stats_enabled,
            vm_stats_enabled,
            retired_energy: Arc::new(DashMap::new()),
        }
    }

    pub fn node(&self) -> &NodeStats {
        &self.node
    }

    pub fn processes(&self) -> &HashMap<Pid, ProcessStats> {
        &self.processes
    }

    pub fn containers(&self) -> &HashMap<ContainerID, ContainerStats> {
        &self.containers
    }

    pub fn vms(&self) -> &HashMap<VmID, VmStats> {
        &self.vms
    }

    pub fn retired_energy(&self) -> Arc<DashMap<Zone, f64>> {
        Arc::clone(&self.retired_energy)
    }

    /// Runs one full aggregation cycle.
    ///
    /// `elapsed_secs` is the wall time since the previous cycle, used to
    /// normalize resource deltas into rates.
    pub fn update(
        &mut self,
        procs: &ProcessesView<'_>,
        containers: &ContainersView<'_>,
        vms: &VirtualMachinesView<'_>,
        readings: &[ZoneReading],
        elapsed_secs: f64,
    ) {
        let started = Instant::now();

        // entities with no fresh data this cycle must report zero, not
        // whatever the previous cycle left behind
        self.reset_delta_values();

        for reading in readings {
            self.node
                .energy
                .entry(reading.zone.clone())
                .or_default()
                .record(reading.power, reading.delta);
        }
        self.node.cpu_time_delta = procs.node_cpu_time_delta;

        self.update_process_stats(procs);
        let (containers_found, vms_found) = self.evict_stale_processes();
        if self.container_stats_enabled {
            self.evict_inactive_containers(&containers_found);
        }
        if self.vm_stats_enabled {
            self.evict_inactive_vms(&vms_found);
        }

        self.aggregate_resources(containers, vms);
        self.aggregate_energy(containers, vms);
        self.finalize_rates(elapsed_secs);

        log::trace!("collector update took {}ns", started.elapsed().as_nanos());
    }

    fn reset_delta_values(&mut self) {
        self.node.reset_delta_values();
        for entry in self.processes.values_mut() {
            entry.reset_delta_values();
        }
        if self.container_stats_enabled {
            for entry in self.containers.values_mut() {
                entry.reset_delta_values();
            }
        }
        if self.vm_stats_enabled {
            for entry in self.vms.values_mut() {
                entry.reset_delta_values();
            }
        }
    }

    /// Merges the informer's running processes into the stats map and
    /// charges each one its estimated per-zone energy.
    fn update_process_stats(&mut self, procs: &ProcessesView<'_>) {
        for (pid, proc) in procs.running {
            let fresh = match self.processes.get(pid) {
                // a reused pid is a different process; never merge its
                // energy with the retired one's
                Some(entry) => entry.start_time_ticks != proc.start_time_ticks,
                None => true,
            };
            if fresh {
                self.processes.insert(*pid, ProcessStats::new(proc));
            }

            let entry = self
                .processes
                .get_mut(pid)
                .expect("process entry inserted above");
            entry.comm = proc.comm.clone();
            entry.exe = proc.exe.clone();
            entry.cpu_time_delta = proc.cpu_time_delta;
            entry.cpu_total_time = proc.cpu_total_time;
            entry.kernel_thread = proc.is_kernel_thread();
            if entry.container_id.is_none() && entry.vm_id.is_none() {
                entry.container_id = proc.ownership.container().map(|c| c.id.clone());
                entry.vm_id = proc.ownership.vm().map(|vm| vm.id.clone());
            }

            entry
                .resources
                .entry(ResourceKind::CpuTime)
                .or_default()
                .add_delta(proc.cpu_time_delta);

            let shares = self.estimator.estimate(
                &self.node.energy,
                procs.node_cpu_time_delta,
                proc.cpu_time_delta,
            );
            for (zone, share) in shares {
                entry
                    .energy
                    .entry(zone)
                    .or_default()
                    .record(share.power, share.delta);
            }
        }

        for (pid, entry) in self.processes.iter_mut() {
            if !procs.running.contains_key(pid) {
                entry.idle_counter += 1;
            }
        }
    }

    /// Deletes processes that were idle and are confirmed gone, and builds
    /// the found-sets used by the container/VM eviction passes.
    fn evict_stale_processes(&mut self) -> (HashSet<ContainerID>, HashSet<VmID>) {
        let mut containers_found = HashSet::new();
        let mut vms_found = HashSet::new();
        let mut dead: Vec<Pid> = Vec::new();

        for (pid, entry) in self.processes.iter_mut() {
            if entry.idle_counter == 0 || self.liveness.process_exists(*pid) {
                entry.idle_counter = 0;

                if self.container_stats_enabled
                    && let Some(id) = &entry.container_id
                    && self.containers.contains_key(id)
                {
                    containers_found.insert(id.clone());
                }
                if self.vm_stats_enabled
                    && let Some(id) = &entry.vm_id
                    && self.vms.contains_key(id)
                {
                    vms_found.insert(id.clone());
                }
                continue;
            }

            dead.push(*pid);
        }

        let tally = log::log_enabled!(log::Level::Debug);
        for pid in &dead {
            let Some(entry) = self.processes.remove(pid) else {
                continue;
            };
            if tally {
                for (zone, usage) in &entry.energy {
                    *self
                        .retired_energy
                        .entry(zone.clone())
                        .or_insert(0.0) += usage.absolute.joules();
                }
            }
        }
        if !dead.is_empty() {
            log::debug!(
                "evicted {} stale processes, {} remain",
                dead.len(),
                self.processes.len()
            );
        }

        (containers_found, vms_found)
    }

    /// Evicts containers neither referenced by a surviving process nor
    /// reported alive by the runtime. Runs only past the hysteresis
    /// threshold so the oracle is not queried every cycle.
    fn evict_inactive_containers(&mut self, found: &HashSet<ContainerID>) {
        let inactive = self.containers.len().saturating_sub(found.len());
        if inactive <= MAX_INACTIVE_CONTAINERS {
            return;
        }

        let live = match self.container_oracle.live_containers() {
            Ok(live) => live,
            Err(err) => {
                log::error!("live container query failed, skipping eviction: {err}");
                return;
            }
        };

        let before = self.containers.len();
        self.containers
            .retain(|id, _| is_reserved(id) || found.contains(id) || live.contains(id));
        log::debug!(
            "evicted {} inactive containers, {} remain",
            before - self.containers.len(),
            self.containers.len()
        );
    }

    fn evict_inactive_vms(&mut self, found: &HashSet<VmID>) {
        let inactive = self.vms.len().saturating_sub(found.len());
        if inactive <= MAX_INACTIVE_VMS {
            return;
        }

        let before = self.vms.len();
        self.vms.retain(|id, _| found.contains(id));
        log::debug!(
            "evicted {} inactive vms, {} remain",
            before - self.vms.len(),
            self.vms.len()
        );
    }

    /// Rolls process resource counters up into containers, VMs, and the
    /// node. Regular processes and kernel threads are folded into the two
    /// reserved pseudo-containers.
    fn aggregate_resources(
        &mut self,
        containers: &ContainersView<'_>,
        vms: &VirtualMachinesView<'_>,
    ) {
        for entry in self.processes.values() {
            for (kind, res) in &entry.resources {
                let delta = res.delta;
                self.node.resources.entry(*kind).or_default().add_delta(delta);

                if self.container_stats_enabled {
                    if let Some(id) = &entry.container_id {
                        if let Some(stats) = ensure_container_stats(
                            &mut self.containers,
                            id,
                            containers,
                        ) {
                            stats.resources.entry(*kind).or_default().add_delta(delta);
                        }
                    } else if entry.vm_id.is_none() {
                        let id = if entry.kernel_thread {
                            KERNEL_CONTAINER_ID
                        } else {
                            SYSTEM_CONTAINER_ID
                        };
                        let stats = pseudo_container_stats(&mut self.containers, id);
                        stats.resources.entry(*kind).or_default().add_delta(delta);
                        if *kind == ResourceKind::CpuTime {
                            stats.cpu_time_delta += delta;
                            stats.cpu_total_time += delta;
                        }
                    }
                }

                if self.vm_stats_enabled
                    && let Some(id) = &entry.vm_id
                    && let Some(vm) = vms.running.get(id)
                {
                    self.vms
                        .entry(id.clone())
                        .or_insert_with(|| VmStats::new(vm))
                        .resources
                        .entry(*kind)
                        .or_default()
                        .add_delta(delta);
                }
            }
        }
    }

    /// Apportions the node's zone energy to containers and VMs by their
    /// share of the node CPU-time delta. The pseudo-containers have no
    /// informer entry, so they receive the sum of their member processes'
    /// estimated zone deltas instead.
    fn aggregate_energy(
        &mut self,
        containers: &ContainersView<'_>,
        vms: &VirtualMachinesView<'_>,
    ) {
        if self.container_stats_enabled {
            for (id, container) in containers.running {
                let Some(stats) =
                    ensure_container_stats(&mut self.containers, id, containers)
                else {
                    continue;
                };
                stats.cpu_time_delta = container.cpu_time_delta;
                stats.cpu_total_time = container.cpu_total_time;

                for (zone, node_usage) in &self.node.energy {
                    let share = apportion(
                        node_usage,
                        containers.node_cpu_time_delta,
                        container.cpu_time_delta,
                    );
                    stats
                        .energy
                        .entry(zone.clone())
                        .or_default()
                        .record(share.power, share.delta);
                }
            }

            for entry in self.processes.values() {
                if entry.container_id.is_some() || entry.vm_id.is_some() {
                    continue;
                }
                let id = if entry.kernel_thread {
                    KERNEL_CONTAINER_ID
                } else {
                    SYSTEM_CONTAINER_ID
                };
                let stats = pseudo_container_stats(&mut self.containers, id);
                for (zone, usage) in &entry.energy {
                    stats
                        .energy
                        .entry(zone.clone())
                        .or_default()
                        .accumulate(usage.power, usage.delta);
                }
            }
        }

        if self.vm_stats_enabled {
            for (id, vm) in vms.running {
                let stats = self
                    .vms
                    .entry(id.clone())
                    .or_insert_with(|| VmStats::new(vm));
                stats.cpu_time_delta = vm.cpu_time_delta;
                stats.cpu_total_time = vm.cpu_total_time;

                for (zone, node_usage) in &self.node.energy {
                    let share =
                        apportion(node_usage, vms.node_cpu_time_delta, vm.cpu_time_delta);
                    stats
                        .energy
                        .entry(zone.clone())
                        .or_default()
                        .record(share.power, share.delta);
                }
            }
        }
    }

    fn finalize_rates(&mut self, elapsed_secs: f64) {
        for res in self.node.resources.values_mut() {
            res.set_rate(elapsed_secs);
        }
        for entry in self.processes.values_mut() {
            for res in entry.resources.values_mut() {
                res.set_rate(elapsed_secs);
            }
        }
        for entry in self.containers.values_mut() {
            for res in entry.resources.values_mut() {
                res.set_rate(elapsed_secs);
            }
        }
        for entry in self.vms.values_mut() {
            for res in entry.resources.values_mut() {
                res.set_rate(elapsed_secs);
            }
        }
    }
}

/// Looks up or lazily creates the stats entry for a real container.
fn ensure_container_stats<'a>(
    stats: &'a mut HashMap<ContainerID, ContainerStats>,
    id: &ContainerID,
    containers: &ContainersView<'_>,
) -> Option<&'a mut ContainerStats> {
    if !stats.contains_key(id) {
        let container = containers.running.get(id)?;
        stats.insert(id.clone(), ContainerStats::new(container));
    }
    stats.get_mut(id)
}

fn pseudo_container_stats<'a>(
    stats: &'a mut HashMap<ContainerID, ContainerStats>,
    id: &str,
) -> &'a mut ContainerStats {
    if !stats.contains_key(id) {
        let id = ContainerID::new(id).expect("reserved ids are valid");
        stats.insert(id.clone(), ContainerStats::pseudo(id));
    }
    stats.get_mut(id).expect("pseudo entry inserted above")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::estimator::CpuRatioEstimator;
    use crate::monitor::usage::{Energy, Power};
    use crate::resource::{
        Container, ContainerInfo, ContainerRuntime, Ownership, Process, VirtualMachine,
    };
    use std::io;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeLiveness {
        alive: Mutex<HashSet<Pid>>,
    }

    impl ProcessLiveness for FakeLiveness {
        fn process_exists(&self, pid: Pid) -> bool {
            self.alive.lock().unwrap().contains(&pid)
        }
    }

    #[derive(Default)]
    struct FakeOracle {
        live: Mutex<HashSet<ContainerID>>,
        fail: Mutex<bool>,
        calls: AtomicUsize,
    }

    impl ContainerLiveness for FakeOracle {
        fn live_containers(&self) -> io::Result<HashSet<ContainerID>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock().unwrap() {
                return Err(io::Error::other("runtime unreachable"));
            }
            Ok(self.live.lock().unwrap().clone())
        }
    }

    fn container_id(n: usize) -> ContainerID {
        ContainerID::new(format!("{n:064x}")).unwrap()
    }

    fn container(n: usize, cpu_time_delta: f64) -> Container {
        Container {
            id: container_id(n),
            name: format!("c{n}"),
            runtime: ContainerRuntime::Docker,
            cgroup_path: String::new(),
            pod_id: None,
            cpu_total_time: cpu_time_delta,
            cpu_time_delta,
        }
    }

    fn process(pid: Pid, cpu_time_delta: f64, ownership: Ownership) -> Process {
        Process {
            pid,
            comm: format!("proc-{pid}"),
            exe: PathBuf::from("/usr/bin/proc"),
            start_time_ticks: 1000,
            cpu_total_time: cpu_time_delta,
            cpu_time_delta,
            ownership,
        }
    }

    fn container_ownership(n: usize) -> Ownership {
        Ownership::Container(ContainerInfo {
            id: container_id(n),
            name: format!("c{n}"),
            runtime: ContainerRuntime::Docker,
            cgroup_path: String::new(),
            pod_id: None,
        })
    }

    struct Fixture {
        procs: HashMap<Pid, Process>,
        terminated_procs: HashMap<Pid, Process>,
        containers: HashMap<ContainerID, Container>,
        terminated_containers: HashMap<ContainerID, Container>,
        vms: HashMap<VmID, VirtualMachine>,
        terminated_vms: HashMap<VmID, VirtualMachine>,
        node_cpu_time_delta: f64,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                procs: HashMap::new(),
                terminated_procs: HashMap::new(),
                containers: HashMap::new(),
                terminated_containers: HashMap::new(),
                vms: HashMap::new(),
                terminated_vms: HashMap::new(),
                node_cpu_time_delta: 0.0,
            }
        }

        fn procs_view(&self) -> ProcessesView<'_> {
            ProcessesView {
                node_cpu_time_delta: self.node_cpu_time_delta,
                running: &self.procs,
                terminated: &self.terminated_procs,
            }
        }

        fn containers_view(&self) -> ContainersView<'_> {
            ContainersView {
                node_cpu_time_delta: self.node_cpu_time_delta,
                running: &self.containers,
                terminated: &self.terminated_containers,
            }
        }

        fn vms_view(&self) -> VirtualMachinesView<'_> {
            VirtualMachinesView {
                node_cpu_time_delta: self.node_cpu_time_delta,
                running: &self.vms,
                terminated: &self.terminated_vms,
            }
        }
    }

    fn collector(liveness: &Arc<FakeLiveness>, oracle: &Arc<FakeOracle>) -> Collector {
        Collector::new(
            Arc::clone(liveness) as Arc<dyn ProcessLiveness>,
            Arc::clone(oracle) as Arc<dyn ContainerLiveness>,
            Box::new(CpuRatioEstimator),
            true,
            true,
        )
    }

    fn reading(zone: &str, watts: f64, joules: f64) -> ZoneReading {
        ZoneReading {
            zone: Zone::new(zone),
            power: Power::from_watts(watts),
            delta: Energy::from_joules(joules),
        }
    }

    fn run_cycle(collector: &mut Collector, fixture: &Fixture, readings: &[ZoneReading]) {
        collector.update(
            &fixture.procs_view(),
            &fixture.containers_view(),
            &fixture.vms_view(),
            readings,
            1.0,
        );
    }

    #[test]
    fn test_container_share_of_node_energy() {
        let liveness = Arc::new(FakeLiveness::default());
        let oracle = Arc::new(FakeOracle::default());
        let mut collector = collector(&liveness, &oracle);

        let mut fixture = Fixture::new();
        fixture.node_cpu_time_delta = 10.0;
        fixture.procs.insert(1, process(1, 2.0, container_ownership(7)));
        fixture.containers.insert(container_id(7), container(7, 2.0));

        run_cycle(&mut collector, &fixture, &[reading("package-0", 100.0, 50.0)]);

        let stats = &collector.containers()[&container_id(7)];
        let usage = &stats.energy["package-0"];
        assert_eq!(usage.power, Power::from_watts(20.0));
        assert_eq!(usage.delta, Energy::from_joules(10.0));
        // cold start: first observation's absolute equals its delta
        assert_eq!(usage.absolute, Energy::from_joules(10.0));
    }

    #[test]
    fn test_absolute_accumulates_across_cycles() {
        let liveness = Arc::new(FakeLiveness::default());
        let oracle = Arc::new(FakeOracle::default());
        let mut collector = collector(&liveness, &oracle);

        let mut fixture = Fixture::new();
        fixture.node_cpu_time_delta = 10.0;
        fixture.procs.insert(1, process(1, 2.0, container_ownership(7)));
        fixture.containers.insert(container_id(7), container(7, 2.0));

        let readings = [reading("package-0", 100.0, 50.0)];
        run_cycle(&mut collector, &fixture, &readings);
        run_cycle(&mut collector, &fixture, &readings);

        let usage = &collector.containers()[&container_id(7)].energy["package-0"];
        assert_eq!(usage.delta, Energy::from_joules(10.0));
        assert_eq!(usage.absolute, Energy::from_joules(20.0));
    }

    #[test]
    fn test_zero_power_zone_attributes_nothing() {
        let liveness = Arc::new(FakeLiveness::default());
        let oracle = Arc::new(FakeOracle::default());
        let mut collector = collector(&liveness, &oracle);

        let mut fixture = Fixture::new();
        fixture.node_cpu_time_delta = 10.0;
        fixture.procs.insert(1, process(1, 2.0, container_ownership(7)));
        fixture.containers.insert(container_id(7), container(7, 2.0));

        run_cycle(&mut collector, &fixture, &[reading("package-0", 100.0, 50.0)]);
        run_cycle(&mut collector, &fixture, &[reading("package-0", 0.0, 0.0)]);

        let usage = &collector.containers()[&container_id(7)].energy["package-0"];
        assert_eq!(usage.power, Power::default());
        assert_eq!(usage.delta, Energy::default());
        // the running total survives a zero cycle
        assert_eq!(usage.absolute, Energy::from_joules(10.0));
    }

    #[test]
    fn test_process_energy_cold_start_and_estimation() {
        let liveness = Arc::new(FakeLiveness::default());
        let oracle = Arc::new(FakeOracle::default());
        let mut collector = collector(&liveness, &oracle);

        let mut fixture = Fixture::new();
        fixture.node_cpu_time_delta = 4.0;
        fixture.procs.insert(9, process(9, 1.0, Ownership::Regular));

        run_cycle(&mut collector, &fixture, &[reading("package-0", 40.0, 20.0)]);

        let usage = &collector.processes()[&9].energy["package-0"];
        assert_eq!(usage.power, Power::from_watts(10.0));
        assert_eq!(usage.delta, Energy::from_joules(5.0));
        assert_eq!(usage.absolute, usage.delta);
    }

    #[test]
    fn test_idle_process_eviction_flow() {
        let liveness = Arc::new(FakeLiveness::default());
        let oracle = Arc::new(FakeOracle::default());
        let mut collector = collector(&liveness, &oracle);

        let mut fixture = Fixture::new();
        fixture.procs.insert(1, process(1, 1.0, Ownership::Regular));
        fixture.procs.insert(2, process(2, 1.0, Ownership::Regular));
        run_cycle(&mut collector, &fixture, &[]);
        assert_eq!(collector.processes().len(), 2);

        // both disappear from the table; pid 1 is still alive per the OS
        fixture.procs.clear();
        liveness.alive.lock().unwrap().insert(1);
        run_cycle(&mut collector, &fixture, &[]);

        assert!(collector.processes().contains_key(&1));
        assert_eq!(collector.processes()[&1].idle_counter, 0);
        assert!(!collector.processes().contains_key(&2));
    }

    #[test]
    fn test_pid_reuse_never_merges_energy() {
        let liveness = Arc::new(FakeLiveness::default());
        let oracle = Arc::new(FakeOracle::default());
        let mut collector = collector(&liveness, &oracle);

        let mut fixture = Fixture::new();
        fixture.node_cpu_time_delta = 2.0;
        fixture.procs.insert(5, process(5, 2.0, Ownership::Regular));
        run_cycle(&mut collector, &fixture, &[reading("package-0", 10.0, 10.0)]);
        assert_eq!(
            collector.processes()[&5].energy["package-0"].absolute,
            Energy::from_joules(10.0)
        );

        // same pid, different start time: a brand-new process
        let mut reused = process(5, 1.0, Ownership::Regular);
        reused.start_time_ticks = 2000;
        fixture.procs.insert(5, reused);
        run_cycle(&mut collector, &fixture, &[reading("package-0", 10.0, 10.0)]);

        let usage = &collector.processes()[&5].energy["package-0"];
        assert_eq!(usage.absolute, Energy::from_joules(5.0));
        assert_eq!(collector.processes()[&5].start_time_ticks, 2000);
    }

    #[test]
    fn test_container_eviction_hysteresis_scenario() {
        let liveness = Arc::new(FakeLiveness::default());
        let oracle = Arc::new(FakeOracle::default());
        let mut collector = collector(&liveness, &oracle);

        // 15 cached containers, 3 of them with running member processes
        let mut fixture = Fixture::new();
        for n in 0..15 {
            let id = container_id(n);
            collector
                .containers
                .insert(id, ContainerStats::new(&container(n, 0.0)));
        }
        for n in 0..3 {
            fixture
                .procs
                .insert(n as Pid + 1, process(n as Pid + 1, 0.1, container_ownership(n)));
            fixture.containers.insert(container_id(n), container(n, 0.1));
        }
        // reserved aggregates must never be deleted
        for id in [SYSTEM_CONTAINER_ID, KERNEL_CONTAINER_ID] {
            let id = ContainerID::new(id).unwrap();
            collector
                .containers
                .insert(id.clone(), ContainerStats::pseudo(id));
        }
        // the oracle knows the 3 running ones plus 2 others
        {
            let mut live = oracle.live.lock().unwrap();
            for n in [0, 1, 2, 3, 4] {
                live.insert(container_id(n));
            }
        }

        run_cycle(&mut collector, &fixture, &[]);

        // 12 of the 17 cached were neither found nor alive, 10 of those are
        // the regular ones; the 2 reserved survive
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        for n in 0..5 {
            assert!(collector.containers().contains_key(&container_id(n)));
        }
        for n in 5..15 {
            assert!(!collector.containers().contains_key(&container_id(n)));
        }
        assert!(collector.containers().contains_key(SYSTEM_CONTAINER_ID));
        assert!(collector.containers().contains_key(KERNEL_CONTAINER_ID));
    }

    #[test]
    fn test_container_eviction_below_threshold_skips_oracle() {
        let liveness = Arc::new(FakeLiveness::default());
        let oracle = Arc::new(FakeOracle::default());
        let mut collector = collector(&liveness, &oracle);

        for n in 0..10 {
            collector
                .containers
                .insert(container_id(n), ContainerStats::new(&container(n, 0.0)));
        }
        let fixture = Fixture::new();
        run_cycle(&mut collector, &fixture, &[]);

        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
        assert_eq!(collector.containers().len(), 10);
    }

    #[test]
    fn test_container_eviction_skipped_on_oracle_failure() {
        let liveness = Arc::new(FakeLiveness::default());
        let oracle = Arc::new(FakeOracle::default());
        *oracle.fail.lock().unwrap() = true;
        let mut collector = collector(&liveness, &oracle);

        for n in 0..12 {
            collector
                .containers
                .insert(container_id(n), ContainerStats::new(&container(n, 0.0)));
        }
        let fixture = Fixture::new();
        run_cycle(&mut collector, &fixture, &[]);

        // availability over tight bounding: nothing was deleted
        assert_eq!(collector.containers().len(), 12);
    }

    #[test]
    fn test_vm_eviction_threshold() {
        let liveness = Arc::new(FakeLiveness::default());
        let oracle = Arc::new(FakeOracle::default());
        let mut collector = collector(&liveness, &oracle);

        for n in 0..4 {
            let vm = VirtualMachine {
                id: VmID::new(format!("vm-{n}")).unwrap(),
                name: format!("vm-{n}"),
                hypervisor: crate::resource::Hypervisor::Qemu,
                cpu_total_time: 0.0,
                cpu_time_delta: 0.0,
            };
            collector.vms.insert(vm.id.clone(), VmStats::new(&vm));
        }

        // 4 inactive > threshold of 3: all swept
        let fixture = Fixture::new();
        run_cycle(&mut collector, &fixture, &[]);
        assert!(collector.vms().is_empty());
    }

    #[test]
    fn test_disabled_toggles_skip_container_and_vm_stats() {
        let liveness = Arc::new(FakeLiveness::default());
        let oracle = Arc::new(FakeOracle::default());
        let mut collector = Collector::new(
            Arc::clone(&liveness) as Arc<dyn ProcessLiveness>,
            Arc::clone(&oracle) as Arc<dyn ContainerLiveness>,
            Box::new(CpuRatioEstimator),
            false,
            false,
        );

        let mut fixture = Fixture::new();
        fixture.node_cpu_time_delta = 2.0;
        fixture.procs.insert(1, process(1, 2.0, container_ownership(1)));
        fixture.containers.insert(container_id(1), container(1, 2.0));

        run_cycle(&mut collector, &fixture, &[reading("package-0", 10.0, 10.0)]);

        assert!(collector.containers().is_empty());
        assert!(collector.vms().is_empty());
        // node and process stats are unaffected by the toggles
        assert!(!collector.processes().is_empty());
    }

    #[test]
    fn test_pseudo_containers_aggregate_uncontained_processes() {
        let liveness = Arc::new(FakeLiveness::default());
        let oracle = Arc::new(FakeOracle::default());
        let mut collector = collector(&liveness, &oracle);

        let mut fixture = Fixture::new();
        fixture.node_cpu_time_delta = 4.0;
        fixture.procs.insert(1, process(1, 3.0, Ownership::Regular));
        let mut kthread = process(2, 1.0, Ownership::Regular);
        kthread.exe = PathBuf::new();
        fixture.procs.insert(2, kthread);

        run_cycle(&mut collector, &fixture, &[reading("package-0", 40.0, 40.0)]);

        let system = &collector.containers()[SYSTEM_CONTAINER_ID];
        assert_eq!(system.cpu_time_delta, 3.0);
        assert_eq!(
            system.energy["package-0"].delta,
            Energy::from_joules(30.0)
        );

        let kernel = &collector.containers()[KERNEL_CONTAINER_ID];
        assert_eq!(kernel.cpu_time_delta, 1.0);
        assert_eq!(kernel.energy["package-0"].delta, Energy::from_joules(10.0));
    }

    #[test]
    fn test_node_resource_rollup_and_rate() {
        let liveness = Arc::new(FakeLiveness::default());
        let oracle = Arc::new(FakeOracle::default());
        let mut collector = collector(&liveness, &oracle);

        let mut fixture = Fixture::new();
        fixture.procs.insert(1, process(1, 0.25, Ownership::Regular));
        fixture.procs.insert(2, process(2, 0.75, Ownership::Regular));

        run_cycle(&mut collector, &fixture, &[]);

        let res = &collector.node().resources[&ResourceKind::CpuTime];
        assert!((res.delta - 1.0).abs() < 1e-9);
        assert!((res.rate - 1.0).abs() < 1e-9);

        // second cycle with no activity: delta resets, absolute keeps
        fixture.procs.clear();
        liveness.alive.lock().unwrap().extend([1, 2]);
        run_cycle(&mut collector, &fixture, &[]);
        let res = &collector.node().resources[&ResourceKind::CpuTime];
        assert_eq!(res.delta, 0.0);
        assert!((res.absolute - 1.0).abs() < 1e-9);
    }
}
