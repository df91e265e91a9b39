//! Proportional apportionment of node zone energy to entities.
//!
//! An entity's share of a zone is its share of the node-wide CPU-time
//! delta. The ratio is intentionally not clamped to `[0, 1]`: a process
//! whose CPU time is not (yet) counted in the denominator can briefly push
//! an entity past the node total, which is accepted as approximation error
//! rather than treated as a failure.

use super::usage::{Energy, Power, Usage};

/// One cycle's worth of apportioned power and energy for a single
/// (entity, zone) pair. Folded into the entity's running totals via
/// [`Usage::record`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Share {
    pub power: Power,
    pub delta: Energy,
}

/// Computes an entity's share of one node zone for the elapsed cycle.
///
/// When the zone measured no power or no energy this cycle, or when the
/// denominator is zero, the share is exactly zero for every entity.
pub fn apportion(node: &Usage, node_cpu_time_delta: f64, cpu_time_delta: f64) -> Share {
    if node.power.is_zero() || node.delta.joules() == 0.0 || node_cpu_time_delta == 0.0 {
        return Share::default();
    }

    let ratio = cpu_time_delta / node_cpu_time_delta;
    Share {
        power: node.power * ratio,
        delta: node.delta * ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_usage(watts: f64, joules: f64) -> Usage {
        let mut usage = Usage::default();
        usage.record(Power::from_watts(watts), Energy::from_joules(joules));
        usage
    }

    #[test]
    fn test_apportion_by_cpu_ratio() {
        let node = node_usage(100.0, 50.0);
        let share = apportion(&node, 10.0, 2.0);
        assert_eq!(share.power, Power::from_watts(20.0));
        assert_eq!(share.delta, Energy::from_joules(10.0));
    }

    #[test]
    fn test_zero_power_guard() {
        let node = node_usage(0.0, 50.0);
        assert_eq!(apportion(&node, 10.0, 2.0), Share::default());
    }

    #[test]
    fn test_zero_delta_guard() {
        let node = node_usage(100.0, 0.0);
        assert_eq!(apportion(&node, 10.0, 2.0), Share::default());
    }

    #[test]
    fn test_zero_denominator_guard() {
        let node = node_usage(100.0, 50.0);
        assert_eq!(apportion(&node, 0.0, 2.0), Share::default());
    }

    #[test]
    fn test_ratio_is_not_clamped() {
        let node = node_usage(100.0, 50.0);
        // entity delta exceeding the denominator is passed through as-is
        let share = apportion(&node, 1.0, 2.0);
        assert_eq!(share.power, Power::from_watts(200.0));
        assert_eq!(share.delta, Energy::from_joules(100.0));
    }

    #[test]
    fn test_cold_start_absolute_equals_delta() {
        let node = node_usage(100.0, 50.0);
        let share = apportion(&node, 10.0, 5.0);

        let mut usage = Usage::default();
        usage.record(share.power, share.delta);
        assert_eq!(usage.absolute, usage.delta);

        // next cycle accumulates on top
        usage.reset_delta();
        let share = apportion(&node, 10.0, 5.0);
        usage.record(share.power, share.delta);
        assert_eq!(usage.absolute, Energy::from_joules(50.0));
        assert_eq!(usage.delta, Energy::from_joules(25.0));
    }
}
