//! The region/store metadata cache contract.

use super::meta::{Region, Store};
use crate::types::{RegionId, StoreId};

/// Shared, concurrently accessed cache of region and store metadata.
///
/// Implementations are shared across every in-flight request. Reads must not
/// block other readers and every mutation must be idempotent: repeating a
/// mutation for the same ids leaves the cache unchanged after the first call.
/// Mutations of unrelated ids must not contend on a global lock.
pub trait RegionCache: Send + Sync + std::fmt::Debug {
    /// Look up a routable region by id.
    fn lookup_region(&self, region_id: RegionId) -> Option<Region>;

    /// Look up a store by id.
    fn lookup_store(&self, store_id: StoreId) -> Option<Store>;

    /// Point the region's leader at the replica on `store_id`.
    ///
    /// Returns `true` if the cached leader changed.
    fn update_leader(&self, region_id: RegionId, store_id: StoreId) -> bool;

    /// Evict a region, forcing a fresh lookup.
    fn invalidate_region(&self, region_id: RegionId);

    /// Evict a store, forcing address re-resolution.
    fn invalidate_store(&self, store_id: StoreId);

    /// Record that the region's definition (range or replicas) is outdated.
    fn mark_region_stale(&self, region_id: RegionId);

    /// Record that a request for `region_id` to `store_id` got no response.
    fn mark_store_suspect(&self, region_id: RegionId, store_id: StoreId);
}
