//! Metrics for routing error handling and region cache maintenance.
//!
//! Each routing error kind and each cache mutation is counted so operators
//! can see how often the cached routing table turns out to be wrong, and why.
//!
//! # Example
//!
//! ```rust
//! use region_router::metrics::{RoutingEvent, RoutingMetrics};
//!
//! let metrics = RoutingMetrics::new();
//! metrics.record_region_error("not_leader");
//! metrics.record(RoutingEvent::LeaderUpdated);
//! assert_eq!(metrics.snapshot().region_errors_total, 1);
//! assert_eq!(metrics.count(RoutingEvent::LeaderUpdated), 1);
//! ```

mod counters;

pub use counters::{EventCounters, LabeledCounter, RoutingEvent};

/// Counters shared by the error handler and the region cache.
#[derive(Debug)]
pub struct RoutingMetrics {
    events: EventCounters,
    /// Routing errors by kind.
    pub region_errors: LabeledCounter<1>,
    /// Classified failures by class.
    pub failures: LabeledCounter<1>,
}

impl RoutingMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self {
            events: EventCounters::new(),
            region_errors: LabeledCounter::new(
                "region_errors_total",
                "Routing errors reported by stores",
                ["kind"],
            ),
            failures: LabeledCounter::new(
                "region_request_failures_total",
                "Classified request failures",
                ["class"],
            ),
        }
    }

    /// Count one occurrence of `event`.
    pub fn record(&self, event: RoutingEvent) {
        self.events.inc(event);
    }

    /// Occurrences of `event` so far.
    pub fn count(&self, event: RoutingEvent) -> u64 {
        self.events.get(event)
    }

    /// Record a routing error by kind label.
    pub fn record_region_error(&self, kind: &'static str) {
        self.region_errors.inc([kind]);
    }

    /// Record a classified failure by class label.
    pub fn record_failure(&self, class: &'static str) {
        self.failures.inc([class]);
    }

    /// Get a snapshot of current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            responses_ok: self.count(RoutingEvent::ResponseOk),
            responses_missing: self.count(RoutingEvent::ResponseMissing),
            region_errors_total: self.region_errors.get_all().iter().map(|(_, v)| v).sum(),
            leader_updates: self.count(RoutingEvent::LeaderUpdated),
            region_invalidations: self.count(RoutingEvent::RegionInvalidated),
            store_invalidations: self.count(RoutingEvent::StoreInvalidated),
            regions_marked_stale: self.count(RoutingEvent::RegionMarkedStale),
            stores_marked_suspect: self.count(RoutingEvent::StoreMarkedSuspect),
        }
    }

    /// Format metrics in Prometheus exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        for event in RoutingEvent::ALL {
            output.push_str(&format!(
                "# HELP {name} {}\n# TYPE {name} counter\n{name} {}\n",
                event.help(),
                self.count(event),
                name = event.metric_name(),
            ));
        }

        for family in [&self.region_errors, &self.failures] {
            output.push_str(&format!(
                "# HELP {name} {}\n# TYPE {name} counter\n",
                family.help(),
                name = family.name(),
            ));
            let label = family.label_names()[0];
            for ([value], count) in family.get_all() {
                output.push_str(&format!(
                    "{}{{{}=\"{}\"}} {}\n",
                    family.name(),
                    label,
                    value,
                    count
                ));
            }
        }

        output
    }
}

impl Default for RoutingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the scalar counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub responses_ok: u64,
    pub responses_missing: u64,
    pub region_errors_total: u64,
    pub leader_updates: u64,
    pub region_invalidations: u64,
    pub store_invalidations: u64,
    pub regions_marked_stale: u64,
    pub stores_marked_suspect: u64,
}
