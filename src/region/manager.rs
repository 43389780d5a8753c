//! In-memory region and store cache.
//!
//! # Locking Strategy
//!
//! Regions and stores live in two `DashMap`s, so readers never block each
//! other and mutations only lock the shard holding the affected id. The key
//! index is a `parking_lot::RwLock<BTreeMap>` touched only by inserts,
//! evictions and key lookups.
//!
//! No method holds a map guard while acquiring the index lock or a guard on
//! the other map. The region map may be read under the index lock, never
//! written. Multi-step mutations (leader failover) read a snapshot,
//! compute the change, then re-check the precondition under the entry guard
//! before applying it.

use super::cache::RegionCache;
use super::meta::{Region, Store, StoreState};
use crate::config::RegionCacheConfig;
use crate::error::Result;
use crate::metrics::{RoutingEvent, RoutingMetrics};
use crate::types::{format_key, RegionId, StoreId};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug)]
struct RegionEntry {
    region: Region,
    /// Set once a store reported a newer epoch. Stale entries are kept only
    /// to reject inserts that would move the epoch backwards.
    stale: bool,
}

/// Outcome of a guarded leader mutation, applied after the guard is dropped.
enum LeaderChange {
    Unchanged,
    Switched,
    Evict,
}

/// Concurrent cache of region and store metadata.
#[derive(Debug)]
pub struct RegionManager {
    config: RegionCacheConfig,
    regions: DashMap<RegionId, RegionEntry>,
    stores: DashMap<StoreId, Store>,
    /// Region start key to region id.
    key_index: RwLock<BTreeMap<Bytes, RegionId>>,
    metrics: Arc<RoutingMetrics>,
}

impl RegionManager {
    /// Create a new manager after validating `config`.
    pub fn new(config: RegionCacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Create with default config.
    pub fn with_defaults() -> Self {
        Self::build(RegionCacheConfig::default())
    }

    fn build(config: RegionCacheConfig) -> Self {
        Self {
            config,
            regions: DashMap::new(),
            stores: DashMap::new(),
            key_index: RwLock::new(BTreeMap::new()),
            metrics: Arc::new(RoutingMetrics::new()),
        }
    }

    /// Share a metrics instance, typically the one given to the handlers.
    pub fn with_metrics(mut self, metrics: Arc<RoutingMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Metrics recorded by this manager.
    pub fn metrics(&self) -> &Arc<RoutingMetrics> {
        &self.metrics
    }

    /// Cache a region loaded from the placement driver.
    ///
    /// Rejected, returning `false`, when its epoch is behind the cached one,
    /// or when the cached entry is stale and the offered epoch is not strictly
    /// newer. Cached regions whose ranges overlap the new one are evicted.
    pub fn insert_region(&self, region: Region) -> bool {
        let region_id = region.id;
        let start_key = region.start_key.clone();
        let end_key = region.end_key.clone();

        if self.regions.len() >= self.config.max_regions && !self.regions.contains_key(&region_id) {
            self.evict_one();
        }

        let previous_start = {
            let mut slot = self
                .regions
                .entry(region_id)
                .or_insert_with(|| RegionEntry {
                    region: region.clone(),
                    stale: false,
                });
            let rejected = region.epoch.is_stale_against(&slot.region.epoch)
                || (slot.stale && region.epoch == slot.region.epoch);
            if rejected {
                debug!(
                    region_id,
                    cached = %slot.region.epoch,
                    offered = %region.epoch,
                    stale = slot.stale,
                    "Rejected region epoch"
                );
                return false;
            }
            let previous = slot.region.start_key.clone();
            slot.region = region;
            slot.stale = false;
            previous
        };

        let overlapped = {
            let mut index = self.key_index.write();
            if previous_start != start_key && index.get(&previous_start) == Some(&region_id) {
                index.remove(&previous_start);
            }
            let overlapped = self.take_overlapping(&mut index, region_id, &start_key, &end_key);
            index.insert(start_key, region_id);
            overlapped
        };

        for victim in overlapped {
            if self.regions.remove(&victim).is_some() {
                self.metrics.record(RoutingEvent::RegionInvalidated);
                debug!(region_id = victim, replaced_by = region_id, "Evicted overlapping region");
            }
        }
        true
    }

    /// Unlink from `index` every other region whose range intersects
    /// `[start_key, end_key)` and return their ids.
    fn take_overlapping(
        &self,
        index: &mut BTreeMap<Bytes, RegionId>,
        region_id: RegionId,
        start_key: &Bytes,
        end_key: &Bytes,
    ) -> Vec<RegionId> {
        let upper: Bound<&[u8]> = if end_key.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end_key.as_ref())
        };
        let mut victims: Vec<(Bytes, RegionId)> = index
            .range::<[u8], _>((Bound::Included(start_key.as_ref()), upper))
            .filter(|(_, id)| **id != region_id)
            .map(|(k, id)| (k.clone(), *id))
            .collect();

        // The region starting before us may still reach into our range.
        let before = index
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(start_key.as_ref())))
            .next_back()
            .map(|(k, id)| (k.clone(), *id));
        if let Some((key, id)) = before {
            let reaches_in = self.regions.get(&id).map(|e| {
                e.region.end_key.is_empty() || &e.region.end_key > start_key
            });
            if id != region_id && reaches_in == Some(true) {
                victims.push((key, id));
            }
        }

        for (key, _) in &victims {
            index.remove(key);
        }
        victims.into_iter().map(|(_, id)| id).collect()
    }

    /// Cache or refresh a store.
    pub fn insert_store(&self, store: Store) {
        self.stores.insert(store.id, store);
    }

    /// Find the routable region containing `key`.
    pub fn region_for_key(&self, key: &[u8]) -> Option<Region> {
        let region_id = {
            let index = self.key_index.read();
            let (_, id) = index
                .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
                .next_back()?;
            *id
        };
        self.lookup_region(region_id).filter(|r| r.contains(key))
    }

    /// Number of cached region entries, stale ones included.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether no regions are cached.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Number of cached stores.
    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    /// Whether the region is cached but flagged stale.
    pub fn is_stale(&self, region_id: RegionId) -> bool {
        self.regions.get(&region_id).map(|e| e.stale).unwrap_or(false)
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.regions.clear();
        self.stores.clear();
        self.key_index.write().clear();
    }

    fn evict_one(&self) {
        let victim = self.regions.iter().next().map(|e| *e.key());
        if let Some(region_id) = victim {
            debug!(region_id, "Region cache full, evicting");
            self.invalidate_region(region_id);
        }
    }

    fn is_store_routable(&self, store_id: StoreId) -> bool {
        self.stores
            .get(&store_id)
            .map(|s| s.state.is_routable())
            .unwrap_or(true)
    }

    /// Move the leader of `region_id` off `store_id` if it is still there.
    fn fail_over_leader(&self, region_id: RegionId, store_id: StoreId) {
        let Some(snapshot) = self.lookup_region(region_id) else {
            return;
        };
        if snapshot.leader_store_id() != Some(store_id) {
            return;
        }

        let candidate = if self.config.failover_on_suspect {
            snapshot.next_leader_excluding(store_id, |s| self.is_store_routable(s))
        } else {
            None
        };

        let change = match self.regions.get_mut(&region_id) {
            Some(mut entry) if !entry.stale && entry.region.leader_store_id() == Some(store_id) => {
                match candidate {
                    Some(peer) => {
                        entry.region.leader = Some(peer);
                        LeaderChange::Switched
                    }
                    None => LeaderChange::Evict,
                }
            }
            _ => LeaderChange::Unchanged,
        };

        match change {
            LeaderChange::Switched => {
                self.metrics.record(RoutingEvent::LeaderUpdated);
                debug!(
                    region_id,
                    from_store = store_id,
                    to_store = candidate.map(|p| p.store_id),
                    "Moved leader off suspect store"
                );
            }
            LeaderChange::Evict => {
                warn!(region_id, store_id, "No routable replica left, evicting region");
                self.invalidate_region(region_id);
            }
            LeaderChange::Unchanged => {}
        }
    }
}

impl Default for RegionManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl RegionCache for RegionManager {
    fn lookup_region(&self, region_id: RegionId) -> Option<Region> {
        self.regions
            .get(&region_id)
            .filter(|e| !e.stale)
            .map(|e| e.region.clone())
    }

    fn lookup_store(&self, store_id: StoreId) -> Option<Store> {
        self.stores.get(&store_id).map(|s| s.value().clone())
    }

    fn update_leader(&self, region_id: RegionId, store_id: StoreId) -> bool {
        let change = match self.regions.get_mut(&region_id) {
            Some(mut entry) if !entry.stale => {
                if entry.region.leader_store_id() == Some(store_id) {
                    LeaderChange::Unchanged
                } else if let Some(region) = entry.region.switch_leader(store_id) {
                    entry.region = region;
                    LeaderChange::Switched
                } else {
                    LeaderChange::Evict
                }
            }
            _ => LeaderChange::Unchanged,
        };

        match change {
            LeaderChange::Switched => {
                self.metrics.record(RoutingEvent::LeaderUpdated);
                debug!(region_id, store_id, "Updated region leader");
                true
            }
            LeaderChange::Evict => {
                warn!(
                    region_id,
                    store_id, "Reported leader store hosts no replica, evicting region"
                );
                self.invalidate_region(region_id);
                false
            }
            LeaderChange::Unchanged => false,
        }
    }

    fn invalidate_region(&self, region_id: RegionId) {
        let Some((_, entry)) = self.regions.remove(&region_id) else {
            return;
        };
        {
            let mut index = self.key_index.write();
            if index.get(&entry.region.start_key) == Some(&region_id) {
                index.remove(&entry.region.start_key);
            }
        }
        self.metrics.record(RoutingEvent::RegionInvalidated);
        debug!(
            region_id,
            start_key = %format_key(&entry.region.start_key),
            "Invalidated region"
        );
    }

    fn invalidate_store(&self, store_id: StoreId) {
        if self.stores.remove(&store_id).is_some() {
            self.metrics.record(RoutingEvent::StoreInvalidated);
            debug!(store_id, "Invalidated store");
        }
    }

    fn mark_region_stale(&self, region_id: RegionId) {
        let newly_stale = match self.regions.get_mut(&region_id) {
            Some(mut entry) if !entry.stale => {
                entry.stale = true;
                true
            }
            _ => false,
        };
        if newly_stale {
            self.metrics.record(RoutingEvent::RegionMarkedStale);
            debug!(region_id, "Marked region stale");
        }
    }

    fn mark_store_suspect(&self, region_id: RegionId, store_id: StoreId) {
        let newly_suspect = match self.stores.get_mut(&store_id) {
            Some(mut store) => {
                store.failures += 1;
                if store.state == StoreState::Up {
                    store.state = StoreState::Suspect;
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        if newly_suspect {
            self.metrics.record(RoutingEvent::StoreMarkedSuspect);
            debug!(store_id, region_id, "Marked store suspect");
        }

        self.fail_over_leader(region_id, store_id);
    }
}
