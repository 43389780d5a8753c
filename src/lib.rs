//! Client-side region routing and routing-error recovery for a
//! Raft-replicated, range-partitioned key-value store.
//!
//! Keys are split into contiguous ranges (regions), each replicated on
//! several stores with one leader. The client caches which store leads each
//! region. That cache goes stale whenever leaders move, regions split or
//! merge, or stores fail, and stores report exactly how it is wrong.
//!
//! This crate provides:
//! - **[`region::RegionManager`]** a concurrent region/store cache with
//!   per-entry locking and idempotent invalidation
//! - **[`handler::RegionErrorHandler`]** which classifies the outcome of one
//!   RPC attempt, repairs the cache, notifies the request, and returns a
//!   typed [`RequestFailure`] for the retry loop
//! - **[`metrics::RoutingMetrics`]** counters per routing error kind
//!
//! # Example
//!
//! ```rust
//! use region_router::handler::{NoopReceiver, RegionErrorHandler, RequestContext};
//! use region_router::region::{Peer, RegionCache, RegionError, RegionManager, Region, Store};
//! use std::sync::Arc;
//!
//! let cache = Arc::new(RegionManager::with_defaults());
//! cache.insert_store(Store::new(1, "10.0.0.1:20160"));
//! cache.insert_store(Store::new(2, "10.0.0.2:20160"));
//! cache.insert_region(
//!     Region::new(42, "a", "z")
//!         .with_peer(Peer::new(1, 1))
//!         .with_peer(Peer::new(2, 2))
//!         .with_leader(1),
//! );
//!
//! let region = cache.region_for_key(b"key").unwrap();
//! let ctx = RequestContext::for_leader(region).unwrap();
//! let handler = RegionErrorHandler::new(
//!     cache.clone(),
//!     Arc::new(NoopReceiver),
//!     ctx,
//!     |resp: &Option<RegionError>| resp.clone(),
//! );
//!
//! // The store says store 2 now leads region 42.
//! let resp = Some(RegionError::NotLeader { region_id: 42, leader: Some(Peer::new(2, 2)) });
//! let failure = handler.handle(Some(&resp)).unwrap_err();
//! assert!(failure.is_retryable());
//! assert_eq!(cache.lookup_region(42).unwrap().leader_store_id(), Some(2));
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod region;
pub mod testing;
pub mod types;

// Re-export main types for convenience
pub use config::{HandlerConfig, RegionCacheConfig, UnknownErrorPolicy};
pub use error::{Error, FailureKind, RequestFailure, Result};
pub use handler::{ErrorExtractor, RegionErrorHandler, RegionErrorReceiver, RequestContext};
pub use metrics::{MetricsSnapshot, RoutingEvent, RoutingMetrics};
pub use region::{Peer, Region, RegionCache, RegionEpoch, RegionError, RegionManager, Store, StoreState};
pub use types::{format_key, PeerId, RegionId, StoreId};
