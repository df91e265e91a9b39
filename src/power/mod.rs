//! Node-level energy acquisition.
//!
//! The monitor consumes the [`EnergyMeter`] contract: a stable set of
//! power zones discovered at startup, and one reading per cycle carrying
//! each zone's energy delta and average power. The default implementation
//! reads the Intel RAPL counters exposed through the powercap sysfs tree.

mod rapl;

use std::path::PathBuf;

use crate::monitor::{Energy, Power, Zone};

pub use rapl::{DEFAULT_POWERCAP_PATH, RaplPowercap};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no power zones found under `{0}`")]
    NoZones(PathBuf),

    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid counter value in `{path}`: `{value}`")]
    Parse { path: PathBuf, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// One zone's measurements for the elapsed cycle.
#[derive(Debug, Clone)]
pub struct ZoneReading {
    pub zone: Zone,
    pub power: Power,
    pub delta: Energy,
}

/// Hardware energy counter access.
///
/// `zones()` is discovered once and stays stable for the process lifetime;
/// every tracked entity carries usage entries for exactly this zone set.
pub trait EnergyMeter: Send {
    fn zones(&self) -> &[Zone];
    fn read(&mut self) -> Result<Vec<ZoneReading>>;
}
