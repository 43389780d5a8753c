//! Per-attempt routing snapshot.

use crate::region::Region;
use crate::types::{RegionId, StoreId};

/// Which region and which store one RPC attempt targeted.
///
/// Captured when the attempt is issued and never mutated. Each retry builds a
/// fresh context from the cache as it is at that time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    region: Region,
    store_id: StoreId,
}

impl RequestContext {
    /// Target `store_id` for a request on `region`.
    pub fn new(region: Region, store_id: StoreId) -> Self {
        Self { region, store_id }
    }

    /// Target the region's current leader. `None` if no leader is known.
    pub fn for_leader(region: Region) -> Option<Self> {
        let store_id = region.leader_store_id()?;
        Some(Self::new(region, store_id))
    }

    /// Region snapshot.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Region id.
    pub fn region_id(&self) -> RegionId {
        self.region.id
    }

    /// Store the attempt was sent to.
    pub fn store_id(&self) -> StoreId {
        self.store_id
    }
}
