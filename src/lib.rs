use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use error::ResultOkLogExt;
use monitor::{Collector, CpuRatioEstimator, Snapshot, SnapshotStore};
use power::{EnergyMeter, RaplPowercap};
use resource::{
    CgroupLiveContainers, Informer, ProcFsReader, ProcfsOwnershipLookup, SignalLiveness,
};

/// Wattmon: a node-level power-attribution agent.
///
/// Samples per-process CPU usage and hardware energy counters once per
/// cycle, classifies processes into containers and virtual machines, and
/// apportions the measured zone energy across the
/// process/container/VM/node hierarchy.
pub mod api;
pub mod error;
pub mod exporter;
pub mod monitor;
pub mod power;
pub mod resource;

// Deployment notes:
//  - reading other users' /proc/<pid>/* and the RAPL counters requires
//    root (or CAP_SYS_PTRACE + readable powercap files)
//  - when running inside a container, mount the host procfs and point
//    WATTMON_PROCFS at it, same for the cgroup root
//  - energy counters are package-wide; on shared machines the attribution
//    denominator only covers processes this instance can see

/// Runtime configuration, read from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub procfs_path: PathBuf,
    pub cgroup_path: PathBuf,
    pub powercap_path: PathBuf,
    pub interval: Duration,
    pub api_addr: String,
    pub stdout_export: bool,
    pub container_stats: bool,
    pub vm_stats: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            procfs_path: env_path("WATTMON_PROCFS", "/proc"),
            cgroup_path: env_path("WATTMON_CGROUPFS", "/sys/fs/cgroup"),
            powercap_path: env_path("WATTMON_POWERCAP", power::DEFAULT_POWERCAP_PATH),
            interval: Duration::from_secs(env_u64("WATTMON_INTERVAL_SECS", 5)),
            api_addr: std::env::var("WATTMON_API_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:28282".to_owned()),
            stdout_export: env_flag("WATTMON_STDOUT", false),
            container_stats: env_flag("WATTMON_CONTAINER_STATS", true),
            vm_stats: env_flag("WATTMON_VM_STATS", true),
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var_os(key)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(raw.as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Runs the agent: one informer/collector pair driven by a fixed-interval
/// loop, with the HTTP API serving the latest published snapshot.
///
/// # Errors
///
/// Returns an error when a required subsystem is unusable at startup
/// (procfs not readable, no RAPL zones discovered). Per-cycle failures are
/// logged and the loop continues.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    log::debug!("config: {config:?}");

    let reader = ProcFsReader::new(&config.procfs_path)?;
    let lookup = Arc::new(ProcfsOwnershipLookup::new(&config.procfs_path));
    let mut informer = Informer::new(Box::new(reader), lookup);
    informer.init()?;

    let mut meter = RaplPowercap::new(&config.powercap_path)?;
    log::info!(
        "tracking {} power zones: {}",
        meter.zones().len(),
        meter
            .zones()
            .iter()
            .map(|zone| zone.as_ref())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut collector = Collector::new(
        Arc::new(SignalLiveness),
        Arc::new(CgroupLiveContainers::new(&config.cgroup_path)),
        Box::new(CpuRatioEstimator),
        config.container_stats,
        config.vm_stats,
    );

    let store = Arc::new(SnapshotStore::new());
    {
        let state = api::ApiState::new(Arc::clone(&store), collector.retired_energy());
        let addr = config.api_addr.clone();
        tokio::spawn(async move {
            api::ApiServer::new(state).listen(addr).await;
        });
        log::debug!("api listening on {}", config.api_addr);
    }

    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_cycle = Instant::now();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let elapsed = last_cycle.elapsed().as_secs_f64();
                last_cycle = Instant::now();
                run_cycle(&mut informer, &mut meter, &mut collector, &store, elapsed).await;

                if config.stdout_export {
                    let snapshot = store.latest();
                    exporter::stdout::write_snapshot(&mut std::io::stdout(), &snapshot)
                        .ok_log("stdout export failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                // a cycle in progress has already completed; only the wait
                // between cycles is interruptible
                log::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// One full cycle: refresh the inventory, read the meter, aggregate, and
/// publish. No failure here stops the agent.
async fn run_cycle(
    informer: &mut Informer,
    meter: &mut impl EnergyMeter,
    collector: &mut Collector,
    store: &SnapshotStore,
    elapsed_secs: f64,
) {
    informer.refresh().await.ok_log("refresh incomplete");

    let readings = meter.read().ok_log("energy read failed").unwrap_or_default();

    let procs = informer.processes();
    let containers = informer.containers();
    let vms = informer.virtual_machines();
    collector.update(&procs, &containers, &vms, &readings, elapsed_secs);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    store.publish(Snapshot::capture(
        timestamp, collector, &procs, &containers, &vms,
    ));
}
