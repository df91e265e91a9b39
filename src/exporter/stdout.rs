//! Fixed-width table dump of a snapshot, written once per cycle when
//! stdout export is enabled. Meant for eyeballing a node, not for machine
//! consumption; the HTTP API serves the structured form.

use std::io::{self, Write};

use crate::monitor::{Snapshot, ZoneUsageMap};

/// Only the busiest processes are printed; everything else is noise at a
/// terminal.
const TOP_PROCESSES: usize = 10;

fn total_power(zones: &ZoneUsageMap) -> f64 {
    zones.values().map(|usage| usage.power.watts()).sum()
}

pub fn write_snapshot(out: &mut impl Write, snapshot: &Snapshot) -> io::Result<()> {
    writeln!(out, "--- snapshot @{} ---", snapshot.timestamp)?;

    writeln!(out, "node (cpu delta {:.3}s):", snapshot.node.cpu_time_delta)?;
    let mut zones: Vec<_> = snapshot.node.energy.iter().collect();
    zones.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));
    writeln!(out, "  {:<20} {:>10} {:>14} {:>14}", "ZONE", "POWER", "DELTA", "TOTAL")?;
    for (zone, usage) in zones {
        writeln!(
            out,
            "  {:<20} {:>10} {:>14} {:>14}",
            zone.as_ref(),
            usage.power.to_string(),
            usage.delta.to_string(),
            usage.absolute.to_string(),
        )?;
    }

    if !snapshot.containers.is_empty() {
        writeln!(out, "containers:")?;
        writeln!(
            out,
            "  {:<14} {:<12} {:>10} {:>12}",
            "NAME", "RUNTIME", "POWER", "CPU DELTA"
        )?;
        let mut containers: Vec<_> = snapshot.containers.values().collect();
        containers.sort_by(|a, b| {
            total_power(&b.energy)
                .partial_cmp(&total_power(&a.energy))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for stats in containers {
            writeln!(
                out,
                "  {:<14} {:<12} {:>9.3}W {:>11.3}s",
                stats.name,
                stats.runtime.to_string(),
                total_power(&stats.energy),
                stats.cpu_time_delta,
            )?;
        }
    }

    if !snapshot.virtual_machines.is_empty() {
        writeln!(out, "virtual machines:")?;
        writeln!(
            out,
            "  {:<14} {:<12} {:>10} {:>12}",
            "NAME", "HYPERVISOR", "POWER", "CPU DELTA"
        )?;
        for stats in snapshot.virtual_machines.values() {
            writeln!(
                out,
                "  {:<14} {:<12} {:>9.3}W {:>11.3}s",
                stats.name,
                stats.hypervisor.to_string(),
                total_power(&stats.energy),
                stats.cpu_time_delta,
            )?;
        }
    }

    let mut procs: Vec<_> = snapshot.processes.values().collect();
    procs.sort_by(|a, b| {
        total_power(&b.energy)
            .partial_cmp(&total_power(&a.energy))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    procs.truncate(TOP_PROCESSES);
    if !procs.is_empty() {
        writeln!(out, "top processes:")?;
        writeln!(out, "  {:<8} {:<18} {:>10} {:>12}", "PID", "COMM", "POWER", "CPU DELTA")?;
        for stats in procs {
            writeln!(
                out,
                "  {:<8} {:<18} {:>9.3}W {:>11.3}s",
                stats.pid, stats.comm, total_power(&stats.energy), stats.cpu_time_delta,
            )?;
        }
    }

    Ok(())
}
