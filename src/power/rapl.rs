//! RAPL energy counters via the powercap sysfs interface.
//!
//! Each `intel-rapl:<n>` directory is a package-level power domain with an
//! `energy_uj` counter in microjoules; `intel-rapl:<n>:<m>` subdirectories
//! are subdomains (dram, core, uncore). Counters are monotonic but wrap at
//! `max_energy_range_uj`, so deltas are corrected for at most one
//! wraparound per cycle.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::monitor::{Energy, Power, Zone};

use super::{EnergyMeter, Error, Result, ZoneReading};

pub const DEFAULT_POWERCAP_PATH: &str = "/sys/class/powercap";

#[derive(Debug)]
struct Domain {
    zone: Zone,
    energy_path: PathBuf,
    max_energy_uj: u64,
    last_uj: u64,
}

/// [`EnergyMeter`] backed by the powercap sysfs tree.
#[derive(Debug)]
pub struct RaplPowercap {
    domains: Vec<Domain>,
    zones: Vec<Zone>,
    last_read: Instant,
}

impl RaplPowercap {
    pub fn new(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref();
        let mut domains = Vec::new();

        let entries = fs::read_dir(base).map_err(|source| Error::Read {
            path: base.to_path_buf(),
            source,
        })?;
        // subzones also show up flat at the top level; only take the
        // package entries here and find subzones nested below them
        let mut packages: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| is_rapl_domain(path) && is_package_name(path))
            .collect();
        packages.sort();

        for package in packages {
            let package_name = read_trimmed(&package.join("name"))?;
            push_domain(&mut domains, &package, &package_name)?;

            let mut subzones: Vec<PathBuf> = fs::read_dir(&package)
                .map_err(|source| Error::Read {
                    path: package.clone(),
                    source,
                })?
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| is_rapl_domain(path))
                .collect();
            subzones.sort();

            for subzone in subzones {
                let sub_name = read_trimmed(&subzone.join("name"))?;
                push_domain(&mut domains, &subzone, &format!("{package_name}-{sub_name}"))?;
            }
        }

        if domains.is_empty() {
            return Err(Error::NoZones(base.to_path_buf()));
        }

        let zones = domains.iter().map(|d| d.zone.clone()).collect();
        log::debug!("discovered {} rapl zones", domains.len());

        Ok(Self {
            domains,
            zones,
            last_read: Instant::now(),
        })
    }

}

impl EnergyMeter for RaplPowercap {
    fn zones(&self) -> &[Zone] {
        &self.zones
    }

    fn read(&mut self) -> Result<Vec<ZoneReading>> {
        let elapsed = self.last_read.elapsed().as_secs_f64();
        self.last_read = Instant::now();

        let mut readings = Vec::with_capacity(self.domains.len());
        for domain in &mut self.domains {
            let current = read_counter(&domain.energy_path)?;
            let delta_uj = wrap_delta(current, domain.last_uj, domain.max_energy_uj);
            domain.last_uj = current;

            let delta = Energy::from_microjoules(delta_uj);
            let power = if elapsed > 0.0 {
                Power::from_watts(delta.joules() / elapsed)
            } else {
                Power::default()
            };

            readings.push(ZoneReading {
                zone: domain.zone.clone(),
                power,
                delta,
            });
        }

        Ok(readings)
    }
}

/// Counter delta with single-wraparound correction.
fn wrap_delta(current: u64, last: u64, max: u64) -> u64 {
    if current >= last {
        current - last
    } else {
        current + (max - last)
    }
}

/// `intel-rapl:<n>` is a package; `intel-rapl:<n>:<m>` is a subzone.
fn is_package_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix("intel-rapl:"))
        .is_some_and(|rest| !rest.contains(':'))
}

fn is_rapl_domain(path: &Path) -> bool {
    path.is_dir()
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("intel-rapl:"))
        && path.join("energy_uj").is_file()
}

fn push_domain(domains: &mut Vec<Domain>, path: &Path, name: &str) -> Result<()> {
    let energy_path = path.join("energy_uj");
    let last_uj = read_counter(&energy_path)?;
    // some platforms hide the range file; fall back to "never wraps"
    let max_energy_uj = read_counter(&path.join("max_energy_range_uj")).unwrap_or(u64::MAX);

    domains.push(Domain {
        zone: Zone::new(name),
        energy_path,
        max_energy_uj,
        last_uj,
    });
    Ok(())
}

fn read_trimmed(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(raw.trim().to_owned())
}

fn read_counter(path: &Path) -> Result<u64> {
    let raw = read_trimmed(path)?;
    raw.parse::<u64>().map_err(|_| Error::Parse {
        path: path.to_path_buf(),
        value: raw,
    })
}
