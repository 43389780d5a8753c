//! Testing utilities for region routing.
//!
//! Provides recording doubles for the [`RegionCache`](crate::region::RegionCache)
//! and [`RegionErrorReceiver`](crate::handler::RegionErrorReceiver) contracts,
//! plus small cluster fixtures.
//!
//! # Example
//!
//! ```rust
//! use region_router::testing::{three_replica_cluster, RecordingCache, CacheCall};
//! use region_router::region::RegionCache;
//! use std::sync::Arc;
//!
//! let cache = RecordingCache::new(Arc::new(three_replica_cluster(42, 7)));
//! cache.invalidate_region(42);
//! assert_eq!(cache.calls(), vec![CacheCall::InvalidateRegion(42)]);
//! ```

mod recording;

pub use recording::{CacheCall, Notification, RecordingCache, RecordingReceiver};

use crate::region::{Peer, Region, RegionEpoch, RegionManager, Store};
use crate::types::{RegionId, StoreId};

/// A region covering the whole key space with replicas on stores
/// `leader_store`, `leader_store + 1` and `leader_store + 2`, led by the first.
pub fn three_replica_region(region_id: RegionId, leader_store: StoreId) -> Region {
    let mut region = Region::new(region_id, "", "").with_epoch(RegionEpoch::new(1, 1));
    for offset in 0..3 {
        let store_id = leader_store + offset;
        region = region.with_peer(Peer::new(region_id * 100 + offset, store_id));
    }
    region.with_leader(leader_store)
}

/// A manager holding [`three_replica_region`] and its three stores.
pub fn three_replica_cluster(region_id: RegionId, leader_store: StoreId) -> RegionManager {
    let manager = RegionManager::with_defaults();
    for store_id in leader_store..leader_store + 3 {
        manager.insert_store(Store::new(store_id, format!("store-{}:20160", store_id)));
    }
    manager.insert_region(three_replica_region(region_id, leader_store));
    manager
}
