//! Region and store metadata as cached by the client.

use crate::types::{format_key, PeerId, RegionId, StoreId};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Version counters of a region.
///
/// `version` is bumped by splits and merges, `conf_ver` by membership changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionEpoch {
    /// Configuration change version.
    pub conf_ver: u64,
    /// Split/merge version.
    pub version: u64,
}

impl RegionEpoch {
    /// Create a new epoch.
    pub fn new(conf_ver: u64, version: u64) -> Self {
        Self { conf_ver, version }
    }

    /// Check whether this epoch is older than `other` in either component.
    pub fn is_stale_against(&self, other: &RegionEpoch) -> bool {
        self.conf_ver < other.conf_ver || self.version < other.version
    }
}

impl std::fmt::Display for RegionEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conf_ver:{} version:{}", self.conf_ver, self.version)
    }
}

/// A single replica of a region, hosted on one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// Peer identifier.
    pub id: PeerId,
    /// Store hosting this replica.
    pub store_id: StoreId,
}

impl Peer {
    /// Create a new peer.
    pub fn new(id: PeerId, store_id: StoreId) -> Self {
        Self { id, store_id }
    }
}

/// A contiguous key range replicated across several stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Region identifier.
    pub id: RegionId,
    /// Inclusive start key. Empty means unbounded.
    pub start_key: Bytes,
    /// Exclusive end key. Empty means unbounded.
    pub end_key: Bytes,
    /// Current epoch as known by the client.
    pub epoch: RegionEpoch,
    /// Replicas in placement order.
    pub peers: Vec<Peer>,
    /// Replica believed to be leader.
    pub leader: Option<Peer>,
}

impl Region {
    /// Create a region with the given key range and no replicas.
    pub fn new(id: RegionId, start_key: impl Into<Bytes>, end_key: impl Into<Bytes>) -> Self {
        Self {
            id,
            start_key: start_key.into(),
            end_key: end_key.into(),
            epoch: RegionEpoch::default(),
            peers: Vec::new(),
            leader: None,
        }
    }

    /// Set the epoch.
    pub fn with_epoch(mut self, epoch: RegionEpoch) -> Self {
        self.epoch = epoch;
        self
    }

    /// Add a replica.
    pub fn with_peer(mut self, peer: Peer) -> Self {
        self.peers.push(peer);
        self
    }

    /// Set the leader. The leader must be one of the replicas.
    pub fn with_leader(mut self, store_id: StoreId) -> Self {
        self.leader = self.peer_on_store(store_id);
        self
    }

    /// Check whether `key` falls inside this region.
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_ref() && (self.end_key.is_empty() || key < self.end_key.as_ref())
    }

    /// Store hosting the current leader, if known.
    pub fn leader_store_id(&self) -> Option<StoreId> {
        self.leader.map(|p| p.store_id)
    }

    /// Replica hosted on `store_id`, if any.
    pub fn peer_on_store(&self, store_id: StoreId) -> Option<Peer> {
        self.peers.iter().copied().find(|p| p.store_id == store_id)
    }

    /// Return a copy with the leader moved to the replica on `store_id`.
    ///
    /// Returns `None` when no replica lives on that store.
    pub fn switch_leader(&self, store_id: StoreId) -> Option<Region> {
        let peer = self.peer_on_store(store_id)?;
        let mut region = self.clone();
        region.leader = Some(peer);
        Some(region)
    }

    /// First replica, in placement order, for which `eligible` holds and that
    /// is not on `excluded`.
    pub fn next_leader_excluding<F>(&self, excluded: StoreId, eligible: F) -> Option<Peer>
    where
        F: Fn(StoreId) -> bool,
    {
        self.peers
            .iter()
            .copied()
            .find(|p| p.store_id != excluded && eligible(p.store_id))
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "region {} [{}, {}) epoch({}) leader:{:?}",
            self.id,
            format_key(&self.start_key),
            format_key(&self.end_key),
            self.epoch,
            self.leader_store_id()
        )
    }
}

/// Liveness state of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StoreState {
    /// Serving normally.
    #[default]
    Up,
    /// A request to this store went unanswered.
    Suspect,
    /// Reported offline by the placement driver.
    Offline,
    /// Permanently removed from the cluster.
    Tombstone,
}

impl StoreState {
    /// Whether requests may be routed to a store in this state.
    pub fn is_routable(&self) -> bool {
        matches!(self, StoreState::Up)
    }
}

impl std::fmt::Display for StoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreState::Up => write!(f, "up"),
            StoreState::Suspect => write!(f, "suspect"),
            StoreState::Offline => write!(f, "offline"),
            StoreState::Tombstone => write!(f, "tombstone"),
        }
    }
}

/// A physical backend node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    /// Store identifier.
    pub id: StoreId,
    /// Network address, `host:port`.
    pub address: String,
    /// Liveness as known by the client.
    pub state: StoreState,
    /// Requests that went unanswered since the store was last refreshed.
    pub failures: u64,
}

impl Store {
    /// Create a store in the `Up` state.
    pub fn new(id: StoreId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            state: StoreState::Up,
            failures: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_region() -> Region {
        Region::new(42, "b", "f")
            .with_epoch(RegionEpoch::new(1, 3))
            .with_peer(Peer::new(1, 7))
            .with_peer(Peer::new(2, 8))
            .with_peer(Peer::new(3, 9))
            .with_leader(7)
    }

    #[test]
    fn test_region_contains() {
        let region = sample_region();
        assert!(region.contains(b"b"));
        assert!(region.contains(b"eeee"));
        assert!(!region.contains(b"f"));
        assert!(!region.contains(b"a"));

        let unbounded = Region::new(1, "", "");
        assert!(unbounded.contains(b""));
        assert!(unbounded.contains(b"zzzz"));
    }

    #[test]
    fn test_switch_leader() {
        let region = sample_region();
        let switched = region.switch_leader(9).unwrap();
        assert_eq!(switched.leader_store_id(), Some(9));
        assert_eq!(switched.leader, Some(Peer::new(3, 9)));
        assert!(region.switch_leader(100).is_none());
    }

    #[test]
    fn test_next_leader_excluding() {
        let region = sample_region();
        let next = region.next_leader_excluding(7, |_| true).unwrap();
        assert_eq!(next.store_id, 8);

        let next = region.next_leader_excluding(7, |s| s != 8).unwrap();
        assert_eq!(next.store_id, 9);

        assert!(region.next_leader_excluding(7, |_| false).is_none());
    }

    #[test]
    fn test_epoch_staleness() {
        let cached = RegionEpoch::new(1, 3);
        assert!(cached.is_stale_against(&RegionEpoch::new(1, 4)));
        assert!(cached.is_stale_against(&RegionEpoch::new(2, 3)));
        assert!(!cached.is_stale_against(&RegionEpoch::new(1, 3)));
        assert!(!RegionEpoch::new(2, 4).is_stale_against(&cached));
    }
}
