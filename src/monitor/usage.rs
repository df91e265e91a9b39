use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, AddAssign, Mul};
use std::sync::Arc;

/// An independently measurable power domain (a CPU package, dram, an
/// uncore domain, a platform-level reading).
///
/// The zone set is discovered once at startup by the energy meter and is
/// identical across all tracked entities. Zones are interned strings, so
/// cloning a `Zone` into every entity map is a refcount bump.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Zone(Arc<str>);

impl Zone {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().into())
    }
}

impl AsRef<str> for Zone {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Zone {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An amount of energy in joules.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Energy(f64);

impl Energy {
    pub fn from_joules(joules: f64) -> Self {
        Self(joules)
    }

    pub fn from_microjoules(uj: u64) -> Self {
        Self(uj as f64 / 1e6)
    }

    pub fn joules(&self) -> f64 {
        self.0
    }
}

impl Add for Energy {
    type Output = Energy;

    fn add(self, rhs: Energy) -> Energy {
        Energy(self.0 + rhs.0)
    }
}

impl AddAssign for Energy {
    fn add_assign(&mut self, rhs: Energy) {
        self.0 += rhs.0;
    }
}

impl Mul<f64> for Energy {
    type Output = Energy;

    fn mul(self, rhs: f64) -> Energy {
        Energy(self.0 * rhs)
    }
}

impl fmt::Display for Energy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}J", self.0)
    }
}

/// A rate of energy use in watts.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Power(f64);

impl Power {
    pub fn from_watts(watts: f64) -> Self {
        Self(watts)
    }

    pub fn watts(&self) -> f64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }
}

impl Add for Power {
    type Output = Power;

    fn add(self, rhs: Power) -> Power {
        Power(self.0 + rhs.0)
    }
}

impl AddAssign for Power {
    fn add_assign(&mut self, rhs: Power) {
        self.0 += rhs.0;
    }
}

impl Mul<f64> for Power {
    type Output = Power;

    fn mul(self, rhs: f64) -> Power {
        Power(self.0 * rhs)
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}W", self.0)
    }
}

/// Energy bookkeeping for one (entity, zone) pair.
///
/// `delta` and `power` describe the cycle that was just measured, `absolute`
/// is cumulative since the pair was first observed. The invariant
/// `absolute_t == absolute_{t-1} + delta_t` holds for every recorded cycle;
/// a freshly created pair starts with `absolute == delta`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    pub power: Power,
    pub delta: Energy,
    pub absolute: Energy,
}

impl Usage {
    /// Records one cycle of measurements, accumulating the running total.
    pub fn record(&mut self, power: Power, delta: Energy) {
        self.power = power;
        self.delta = delta;
        self.absolute += delta;
    }

    /// Folds another entity's cycle measurements into this one. Used for
    /// bottom-up rollups where several processes feed one aggregate.
    pub fn accumulate(&mut self, power: Power, delta: Energy) {
        self.power += power;
        self.delta += delta;
        self.absolute += delta;
    }

    /// Clears the per-cycle fields. `absolute` is untouched, so entities
    /// that receive no new data report zero delta and power rather than
    /// stale numbers.
    pub fn reset_delta(&mut self) {
        self.power = Power::default();
        self.delta = Energy::default();
    }
}

pub type ZoneUsageMap = HashMap<Zone, Usage>;

/// Raw utilization counters tracked per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    CpuTime,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::CpuTime => "cpu_time",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delta/absolute/rate bookkeeping for one raw resource counter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    /// Amount accrued during the cycle that was just measured.
    pub delta: f64,
    /// Cumulative amount since the entity was first observed.
    pub absolute: f64,
    /// `delta` normalized by the elapsed cycle time.
    pub rate: f64,
}

impl ResourceUsage {
    pub fn add_delta(&mut self, delta: f64) {
        self.delta += delta;
        self.absolute += delta;
    }

    pub fn set_rate(&mut self, elapsed_secs: f64) {
        self.rate = if elapsed_secs > 0.0 {
            self.delta / elapsed_secs
        } else {
            0.0
        };
    }

    pub fn reset_delta(&mut self) {
        self.delta = 0.0;
        self.rate = 0.0;
    }
}

pub type ResourceUsageMap = HashMap<ResourceKind, ResourceUsage>;
