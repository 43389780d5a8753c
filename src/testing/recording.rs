//! Recording doubles for the region cache and the notification sink.

use crate::handler::RegionErrorReceiver;
use crate::region::{Region, RegionCache, RegionManager, Store};
use crate::types::{RegionId, StoreId};
use parking_lot::Mutex;
use std::sync::Arc;

/// A mutation observed by [`RecordingCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCall {
    UpdateLeader(RegionId, StoreId),
    InvalidateRegion(RegionId),
    InvalidateStore(StoreId),
    MarkRegionStale(RegionId),
    MarkStoreSuspect(RegionId, StoreId),
}

/// Wraps a [`RegionManager`] and records every mutation passed through it.
///
/// Lookups are forwarded without being recorded.
#[derive(Debug)]
pub struct RecordingCache {
    inner: Arc<RegionManager>,
    calls: Mutex<Vec<CacheCall>>,
}

impl RecordingCache {
    /// Wrap `inner`.
    pub fn new(inner: Arc<RegionManager>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The wrapped manager.
    pub fn inner(&self) -> &Arc<RegionManager> {
        &self.inner
    }

    /// Mutations recorded so far, in call order.
    pub fn calls(&self) -> Vec<CacheCall> {
        self.calls.lock().clone()
    }

    /// How many times `call` was recorded.
    pub fn count(&self, call: CacheCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    fn record(&self, call: CacheCall) {
        self.calls.lock().push(call);
    }
}

impl RegionCache for RecordingCache {
    fn lookup_region(&self, region_id: RegionId) -> Option<Region> {
        self.inner.lookup_region(region_id)
    }

    fn lookup_store(&self, store_id: StoreId) -> Option<Store> {
        self.inner.lookup_store(store_id)
    }

    fn update_leader(&self, region_id: RegionId, store_id: StoreId) -> bool {
        self.record(CacheCall::UpdateLeader(region_id, store_id));
        self.inner.update_leader(region_id, store_id)
    }

    fn invalidate_region(&self, region_id: RegionId) {
        self.record(CacheCall::InvalidateRegion(region_id));
        self.inner.invalidate_region(region_id)
    }

    fn invalidate_store(&self, store_id: StoreId) {
        self.record(CacheCall::InvalidateStore(store_id));
        self.inner.invalidate_store(store_id)
    }

    fn mark_region_stale(&self, region_id: RegionId) {
        self.record(CacheCall::MarkRegionStale(region_id));
        self.inner.mark_region_stale(region_id)
    }

    fn mark_store_suspect(&self, region_id: RegionId, store_id: StoreId) {
        self.record(CacheCall::MarkStoreSuspect(region_id, store_id));
        self.inner.mark_store_suspect(region_id, store_id)
    }
}

/// A notification observed by [`RecordingReceiver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    LeaderChanged { region: Region, store: Store },
    RoutingInvalidated,
}

/// Records every notification it receives.
#[derive(Debug, Default)]
pub struct RecordingReceiver {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingReceiver {
    /// Create an empty receiver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far, in order.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    /// Whether nothing was received.
    pub fn is_empty(&self) -> bool {
        self.notifications.lock().is_empty()
    }
}

impl RegionErrorReceiver for RecordingReceiver {
    fn on_leader_changed(&self, region: &Region, store: &Store) {
        self.notifications.lock().push(Notification::LeaderChanged {
            region: region.clone(),
            store: store.clone(),
        });
    }

    fn on_routing_invalidated(&self) {
        self.notifications.lock().push(Notification::RoutingInvalidated);
    }
}
