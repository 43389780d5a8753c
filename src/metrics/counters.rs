//! Monotonic counters: a fixed set of routing events, and labeled families.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Routing events counted without labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingEvent {
    /// A response carried no routing error.
    ResponseOk,
    /// An attempt produced no response.
    ResponseMissing,
    /// A cached leader pointer changed.
    LeaderUpdated,
    /// A region was evicted from the cache.
    RegionInvalidated,
    /// A store was evicted from the cache.
    StoreInvalidated,
    /// A region was flagged with a stale epoch.
    RegionMarkedStale,
    /// A store was flagged after a missing response.
    StoreMarkedSuspect,
}

impl RoutingEvent {
    /// Every event, in exposition order.
    pub const ALL: [RoutingEvent; 7] = [
        RoutingEvent::ResponseOk,
        RoutingEvent::ResponseMissing,
        RoutingEvent::LeaderUpdated,
        RoutingEvent::RegionInvalidated,
        RoutingEvent::StoreInvalidated,
        RoutingEvent::RegionMarkedStale,
        RoutingEvent::StoreMarkedSuspect,
    ];

    /// Prometheus metric name.
    pub fn metric_name(self) -> &'static str {
        match self {
            RoutingEvent::ResponseOk => "region_responses_ok_total",
            RoutingEvent::ResponseMissing => "region_responses_missing_total",
            RoutingEvent::LeaderUpdated => "region_cache_leader_updates_total",
            RoutingEvent::RegionInvalidated => "region_cache_region_invalidations_total",
            RoutingEvent::StoreInvalidated => "region_cache_store_invalidations_total",
            RoutingEvent::RegionMarkedStale => "region_cache_regions_stale_total",
            RoutingEvent::StoreMarkedSuspect => "region_cache_stores_suspect_total",
        }
    }

    /// Prometheus help text.
    pub fn help(self) -> &'static str {
        match self {
            RoutingEvent::ResponseOk => "Responses without routing error",
            RoutingEvent::ResponseMissing => "Attempts that produced no response",
            RoutingEvent::LeaderUpdated => "Leader pointer changes",
            RoutingEvent::RegionInvalidated => "Regions evicted from the cache",
            RoutingEvent::StoreInvalidated => "Stores evicted from the cache",
            RoutingEvent::RegionMarkedStale => "Regions flagged with a stale epoch",
            RoutingEvent::StoreMarkedSuspect => "Stores flagged after a missing response",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// One atomic per [`RoutingEvent`], indexed by the event itself.
#[derive(Debug, Default)]
pub struct EventCounters {
    values: [AtomicU64; RoutingEvent::ALL.len()],
}

impl EventCounters {
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `event`.
    pub fn inc(&self, event: RoutingEvent) {
        self.values[event.slot()].fetch_add(1, Ordering::Relaxed);
    }

    /// Occurrences of `event` so far.
    pub fn get(&self, event: RoutingEvent) -> u64 {
        self.values[event.slot()].load(Ordering::Relaxed)
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for value in &self.values {
            value.store(0, Ordering::Relaxed);
        }
    }
}

/// A counter family keyed by static label values.
///
/// Label values come from closed sets (error kinds, failure classes), so keys
/// are `&'static str` and no allocation happens on the hot path.
#[derive(Debug)]
pub struct LabeledCounter<const N: usize> {
    name: &'static str,
    help: &'static str,
    label_names: [&'static str; N],
    series: RwLock<HashMap<[&'static str; N], AtomicU64>>,
}

impl<const N: usize> LabeledCounter<N> {
    /// Create a new labeled counter.
    pub fn new(name: &'static str, help: &'static str, label_names: [&'static str; N]) -> Self {
        Self {
            name,
            help,
            label_names,
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Metric name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Metric help text.
    pub fn help(&self) -> &'static str {
        self.help
    }

    /// Label names.
    pub fn label_names(&self) -> &[&'static str; N] {
        &self.label_names
    }

    /// Increment the series for `labels` by one.
    pub fn inc(&self, labels: [&'static str; N]) {
        if let Some(counter) = self.series.read().get(&labels) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.series
            .write()
            .entry(labels)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Value of the series for `labels`, zero if never incremented.
    pub fn get(&self, labels: [&'static str; N]) -> u64 {
        self.series
            .read()
            .get(&labels)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// All series, sorted by label values.
    pub fn get_all(&self) -> Vec<([&'static str; N], u64)> {
        let mut all: Vec<_> = self
            .series
            .read()
            .iter()
            .map(|(k, v)| (*k, v.load(Ordering::Relaxed)))
            .collect();
        all.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Drop every series.
    pub fn reset(&self) {
        self.series.write().clear();
    }
}
