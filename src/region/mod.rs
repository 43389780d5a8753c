//! Region and store metadata, the cache contract and its in-memory implementation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   RegionCache (trait)                     │
//! │  lookup_region / lookup_store                             │
//! │  update_leader / invalidate_region / invalidate_store     │
//! │  mark_region_stale / mark_store_suspect                   │
//! └──────────────────────────────────────────────────────────┘
//!                          ▲
//!                          │ implements
//! ┌──────────────────────────────────────────────────────────┐
//! │                     RegionManager                         │
//! │  DashMap<RegionId, _>   DashMap<StoreId, Store>           │
//! │  RwLock<BTreeMap<start_key, RegionId>>                    │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod cache;
mod error;
mod manager;
mod meta;

pub use cache::RegionCache;
pub use error::RegionError;
pub use manager::RegionManager;
pub use meta::{Peer, Region, RegionEpoch, Store, StoreState};
