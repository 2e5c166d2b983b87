// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Compact numeric IDs for connected peers.
//!
//! Provenance sets store one entry per peer that has shown us a transaction,
//! for every pending transaction, so they hold 16-bit IDs instead of peer
//! identity strings. The allocator hands out the IDs and reclaims them on
//! disconnect.

use crate::gossip::types::UNKNOWN_PEER_ID;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// A node never has more than this many active IDs; one slot is permanently
/// taken by [`UNKNOWN_PEER_ID`].
const MAX_ACTIVE_IDS: usize = u16::MAX as usize;

pub(crate) struct PeerIds {
    inner: RwLock<PeerIdsInner>,
}

struct PeerIdsInner {
    peer_map: HashMap<String, u16>,
    active_ids: HashSet<u16>,
    next_id: u16,
}

impl PeerIdsInner {
    /// Picks the next unused ID, wrapping through the 16-bit space.
    fn next_peer_id(&mut self) -> u16 {
        if self.active_ids.len() == MAX_ACTIVE_IDS {
            panic!(
                "node has maximum {} active peer IDs and wanted one more",
                MAX_ACTIVE_IDS
            );
        }
        while self.active_ids.contains(&self.next_id) {
            self.next_id = self.next_id.wrapping_add(1);
        }
        let cur_id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        cur_id
    }
}

impl PeerIds {
    pub fn new() -> Self {
        let mut active_ids = HashSet::new();
        // reserve UNKNOWN_PEER_ID for transactions submitted without a peer
        active_ids.insert(UNKNOWN_PEER_ID);
        Self {
            inner: RwLock::new(PeerIdsInner {
                peer_map: HashMap::new(),
                active_ids,
                next_id: 1,
            }),
        }
    }

    /// Assigns the next unused ID to `peer`.
    ///
    /// Panics if all 16-bit IDs are in use; a node holding 65k concurrent
    /// peer connections is misconfigured and cannot gossip correctly.
    pub fn reserve_for_peer(&self, peer: &str) {
        let mut inner = self.inner.write();
        let cur_id = inner.next_peer_id();
        inner.peer_map.insert(peer.to_string(), cur_id);
        inner.active_ids.insert(cur_id);
    }

    /// The ID assigned to `peer`, or [`UNKNOWN_PEER_ID`] if the peer is not
    /// known. Unknown peers are a legitimate teardown race; callers treat
    /// the result like a local submission.
    pub fn get_for_peer(&self, peer: &str) -> u16 {
        self.inner
            .read()
            .peer_map
            .get(peer)
            .copied()
            .unwrap_or(UNKNOWN_PEER_ID)
    }

    /// Returns the ID reserved for `peer` to the unused pool. No-op for
    /// unknown peers.
    pub fn reclaim(&self, peer: &str) {
        let mut inner = self.inner.write();
        if let Some(removed_id) = inner.peer_map.remove(peer) {
            inner.active_ids.remove(&removed_id);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ids_are_unique_and_nonzero() {
        let ids = PeerIds::new();
        for n in 0..50 {
            ids.reserve_for_peer(&format!("peer-{}", n));
        }
        let mut seen = HashSet::new();
        for n in 0..50 {
            let id = ids.get_for_peer(&format!("peer-{}", n));
            assert_ne!(id, UNKNOWN_PEER_ID);
            assert!(seen.insert(id), "id {} assigned twice", id);
        }
    }

    #[test]
    fn unknown_peer_resolves_to_the_reserved_id() {
        let ids = PeerIds::new();
        assert_eq!(ids.get_for_peer("nobody"), UNKNOWN_PEER_ID);
    }

    #[test]
    fn reclaim_frees_the_id_for_reuse() {
        let ids = PeerIds::new();
        ids.reserve_for_peer("a");
        let id_a = ids.get_for_peer("a");
        ids.reclaim("a");
        assert_eq!(ids.get_for_peer("a"), UNKNOWN_PEER_ID);

        // the cursor has moved on, but the freed value comes back once the
        // space wraps
        ids.reserve_for_peer("b");
        assert_ne!(ids.get_for_peer("b"), id_a);
    }

    #[test]
    fn reclaim_is_idempotent_for_unknown_peers() {
        let ids = PeerIds::new();
        ids.reclaim("never-connected");
        ids.reserve_for_peer("a");
        ids.reclaim("a");
        ids.reclaim("a");
        assert_eq!(ids.get_for_peer("a"), UNKNOWN_PEER_ID);
    }

    #[test]
    fn cursor_wraps_around_the_sixteen_bit_space() {
        let ids = PeerIds::new();
        {
            let mut inner = ids.inner.write();
            inner.next_id = u16::MAX;
        }
        ids.reserve_for_peer("last");
        assert_eq!(ids.get_for_peer("last"), u16::MAX);
        // 0 is reserved, so the wrap lands on 1
        ids.reserve_for_peer("wrapped");
        assert_eq!(ids.get_for_peer("wrapped"), 1);
    }

    #[test]
    fn saturation_boundary_allows_reuse_after_disconnect() {
        let ids = PeerIds::new();
        for n in 0..(MAX_ACTIVE_IDS - 1) {
            ids.reserve_for_peer(&format!("peer-{}", n));
        }
        // every ID is now taken; freeing one makes room for exactly one more
        ids.reclaim("peer-0");
        ids.reserve_for_peer("replacement");
        assert_ne!(ids.get_for_peer("replacement"), UNKNOWN_PEER_ID);
    }

    #[test]
    #[should_panic(expected = "active peer IDs")]
    fn saturation_panics() {
        let ids = PeerIds::new();
        for n in 0..MAX_ACTIVE_IDS {
            ids.reserve_for_peer(&format!("peer-{}", n));
        }
    }

    proptest! {
        #[test]
        fn reserve_reclaim_interleavings_keep_ids_unique(ops in prop::collection::vec((0u8..2, 0u16..64), 1..256)) {
            let ids = PeerIds::new();
            let mut connected = HashSet::new();
            for (op, n) in ops {
                let peer = format!("peer-{}", n);
                if op == 0 && !connected.contains(&peer) {
                    ids.reserve_for_peer(&peer);
                    connected.insert(peer);
                } else {
                    ids.reclaim(&peer);
                    connected.remove(&peer);
                }
            }
            let mut seen = HashSet::new();
            for peer in &connected {
                let id = ids.get_for_peer(peer);
                prop_assert_ne!(id, UNKNOWN_PEER_ID);
                prop_assert!(seen.insert(id));
            }
        }
    }
}
