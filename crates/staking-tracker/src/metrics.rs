//! Prometheus metrics of the staking tracker.
//!
//! The metrics are registered in a caller-provided [`Registry`]; exposing the registry is left to
//! the embedding process.

use std::fmt;

use prometheus::{IntCounter, IntGauge, Opts, Registry};

/// Counters and gauges updated by the tracker components.
///
/// Cloning is cheap: clones update the same underlying metrics.
#[derive(Clone)]
pub struct TrackerMetrics {
    /// Finality providers whose delegations have been swept for slashing.
    pub slashed_fps: IntCounter,

    /// Slashing transactions broadcast.
    pub slashed_delegations: IntCounter,

    /// Unbondings reported to the App chain.
    pub reported_unbondings: IntCounter,

    /// Unbonding reports that failed and were scheduled for retry.
    pub failed_unbonding_reports: IntCounter,

    /// Delegations held by the atomic slasher's index.
    pub tracked_delegations: IntGauge,
}

#[cfg_attr(coverage_nightly, coverage(off))]
impl fmt::Debug for TrackerMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerMetrics")
            .field("slashed_fps", &self.slashed_fps.get())
            .field("slashed_delegations", &self.slashed_delegations.get())
            .field("reported_unbondings", &self.reported_unbondings.get())
            .field("failed_unbonding_reports", &self.failed_unbonding_reports.get())
            .field("tracked_delegations", &self.tracked_delegations.get())
            .finish()
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::with_opts(Opts::new(name, help).namespace("vigilante"))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl TrackerMetrics {
    /// Creates the metrics and registers them with `registry`.
    ///
    /// Fails if a metric of the same name is already registered.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let tracked_delegations = IntGauge::with_opts(
            Opts::new(
                "tracked_delegations",
                "Number of delegations tracked by the atomic slasher",
            )
            .namespace("vigilante"),
        )?;
        registry.register(Box::new(tracked_delegations.clone()))?;

        Ok(Self {
            slashed_fps: counter(
                registry,
                "slashed_finality_providers_total",
                "Number of finality providers whose delegations were swept for slashing",
            )?,
            slashed_delegations: counter(
                registry,
                "slashed_delegations_total",
                "Number of slashing transactions broadcast",
            )?,
            reported_unbondings: counter(
                registry,
                "reported_unbondings_total",
                "Number of unbondings reported to the App chain",
            )?,
            failed_unbonding_reports: counter(
                registry,
                "failed_unbonding_reports_total",
                "Number of failed unbonding report attempts",
            )?,
            tracked_delegations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_once_per_registry() {
        let registry = Registry::new();
        let metrics = TrackerMetrics::new(&registry).unwrap();
        metrics.slashed_delegations.inc();
        metrics.tracked_delegations.set(3);

        let families = registry.gather();
        assert_eq!(families.len(), 5);
        assert!(families
            .iter()
            .any(|f| f.get_name() == "vigilante_slashed_delegations_total"));

        assert!(TrackerMetrics::new(&registry).is_err());
        assert!(TrackerMetrics::new(&Registry::new()).is_ok());
    }
}
