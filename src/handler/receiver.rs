//! Callbacks into the request that owns the retry loop.

use crate::region::{Region, Store};

/// Receives routing facts discovered while handling a response.
///
/// Implemented by the request object driving retries, so its next attempt can
/// be redirected without consulting the cache again.
pub trait RegionErrorReceiver: Send + Sync {
    /// The region's leader moved to `store`. `region` is the refreshed copy.
    fn on_leader_changed(&self, region: &Region, store: &Store);

    /// Cached routing for the attempt is gone and must be fully re-resolved.
    fn on_routing_invalidated(&self);
}

/// A receiver that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReceiver;

impl RegionErrorReceiver for NoopReceiver {
    fn on_leader_changed(&self, _region: &Region, _store: &Store) {}

    fn on_routing_invalidated(&self) {}
}
