//! Structured routing errors reported by stores.
//!
//! At most one variant is present per response. Absence means the request
//! reached a store that could serve it.

use super::meta::{Peer, Region};
use crate::error::Result;
use crate::types::{format_key, RegionId, StoreId};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A routing error embedded in a store response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionError {
    /// The target store is not the leader. Carries the new leader if known.
    NotLeader {
        region_id: RegionId,
        leader: Option<Peer>,
    },

    /// The request reached a store other than the one it was addressed to.
    StoreNotMatch {
        request_store_id: StoreId,
        actual_store_id: StoreId,
    },

    /// The region epoch in the request is behind the store's.
    StaleEpoch {
        /// Regions now covering the range, when the store reports them.
        new_regions: Vec<Region>,
    },

    /// The store is overloaded.
    ServerIsBusy { reason: String, backoff_ms: u64 },

    /// The command was proposed in an older term and dropped.
    StaleCommand,

    /// The Raft entry exceeds the store's size limit.
    RaftEntryTooLarge { region_id: RegionId, entry_size: u64 },

    /// The key is outside the region's range on the store.
    KeyNotInRegion {
        key: Bytes,
        region_id: RegionId,
        start_key: Bytes,
        end_key: Bytes,
    },

    /// Any error kind this client does not recognize.
    Other { message: String },
}

impl RegionError {
    /// Stable label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            RegionError::NotLeader { .. } => "not_leader",
            RegionError::StoreNotMatch { .. } => "store_not_match",
            RegionError::StaleEpoch { .. } => "stale_epoch",
            RegionError::ServerIsBusy { .. } => "server_is_busy",
            RegionError::StaleCommand => "stale_command",
            RegionError::RaftEntryTooLarge { .. } => "raft_entry_too_large",
            RegionError::KeyNotInRegion { .. } => "key_not_in_region",
            RegionError::Other { .. } => "other",
        }
    }

    /// Encode for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from the wire.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

impl std::fmt::Display for RegionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionError::NotLeader { region_id, leader } => match leader {
                Some(peer) => write!(
                    f,
                    "not_leader {{ region_id: {}, leader: {{ id: {}, store_id: {} }} }}",
                    region_id, peer.id, peer.store_id
                ),
                None => write!(f, "not_leader {{ region_id: {}, leader: unknown }}", region_id),
            },
            RegionError::StoreNotMatch {
                request_store_id,
                actual_store_id,
            } => write!(
                f,
                "store_not_match {{ request_store_id: {}, actual_store_id: {} }}",
                request_store_id, actual_store_id
            ),
            RegionError::StaleEpoch { new_regions } => {
                let ids: Vec<RegionId> = new_regions.iter().map(|r| r.id).collect();
                write!(f, "stale_epoch {{ new_regions: {:?} }}", ids)
            }
            RegionError::ServerIsBusy { reason, backoff_ms } => write!(
                f,
                "server_is_busy {{ reason: {:?}, backoff_ms: {} }}",
                reason, backoff_ms
            ),
            RegionError::StaleCommand => write!(f, "stale_command"),
            RegionError::RaftEntryTooLarge {
                region_id,
                entry_size,
            } => write!(
                f,
                "raft_entry_too_large {{ region_id: {}, entry_size: {} }}",
                region_id, entry_size
            ),
            RegionError::KeyNotInRegion {
                key,
                region_id,
                start_key,
                end_key,
            } => write!(
                f,
                "key_not_in_region {{ key: \"{}\", region_id: {}, start_key: \"{}\", end_key: \"{}\" }}",
                format_key(key),
                region_id,
                format_key(start_key),
                format_key(end_key)
            ),
            RegionError::Other { message } => write!(f, "{}", message),
        }
    }
}
