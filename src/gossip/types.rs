// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Contracts and shared objects of the gossip subsystem.

use crate::gossip::peer_ids::PeerIds;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use thiserror::Error;
use tokio::sync::watch;

/// Source ID recorded for transactions that did not arrive from a peer
/// (e.g. local RPC submissions). Never assigned to a connected peer.
pub const UNKNOWN_PEER_ID: u16 = 0;

/// A connected peer as seen by the gossip subsystem.
///
/// Implementations are cheap handles (`Clone` is expected to be an `Arc`
/// bump) owned by the network switch.
pub trait Peer: Clone + Send + Sync + 'static {
    /// Stable identity string of the peer. Used as the metrics label and as
    /// the key for numeric-ID assignment.
    fn id(&self) -> &str;

    /// Queue `payload` on the peer's output buffer for `channel_id`.
    /// Returns false if the buffer is full; the message is dropped and the
    /// caller is expected to retry.
    fn try_send(&self, channel_id: u8, payload: Bytes) -> bool;

    /// Whether the connection is still live.
    fn is_running(&self) -> bool;

    /// One-shot stop signal; the receiver observes `true` once the peer is
    /// being torn down.
    fn quit(&self) -> watch::Receiver<bool>;

    /// The peer-state object another subsystem installs in the peer's
    /// attribute bag. `None` while that installation has not happened yet.
    fn state(&self) -> Option<Arc<dyn PeerState>>;
}

/// The slice of consensus-tracked peer state the broadcaster needs.
pub trait PeerState: Send + Sync {
    /// The peer's current block height as it last reported it.
    fn height(&self) -> u64;
}

/// The network switch the reactor is wired into.
pub trait Switch: Send + Sync + 'static {
    type Peer: Peer;

    /// Whether the peer is marked persistent in the operator's topology.
    fn is_persistent(&self, peer: &Self::Peer) -> bool;

    /// Tear the peer down, recording `err` as the reason. Used when a peer
    /// violates the wire protocol.
    fn stop_peer_for_error(&self, peer: &Self::Peer, err: anyhow::Error);
}

/// Admission attribution handed to the mempool together with a transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TxInfo {
    /// Numeric ID of the peer the transaction came from, or
    /// [`UNKNOWN_PEER_ID`] for local submissions.
    pub sender_id: u16,
    /// Whether the source peer is classified persistent.
    pub from_persistent: bool,
}

/// Why the mempool refused a transaction.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MempoolError {
    #[error("transaction already in cache")]
    TxInCache,
    #[error("mempool is full ({size} >= {capacity})")]
    MempoolIsFull { size: usize, capacity: usize },
    #[error("transaction is too large ({size} > {max})")]
    TxTooLarge { size: usize, max: usize },
    #[error("invalid transaction: {0}")]
    InvalidTx(String),
}

/// The mempool contract the gossip subsystem consumes.
///
/// The mempool keeps pending transactions in insertion order and lets
/// walkers follow the list element by element. All methods are callable from
/// any task; the mempool enforces its own internal synchronization.
pub trait Mempool: Send + Sync + 'static {
    type Entry: TxEntry;

    /// Validate and append a transaction, recording `info.sender_id` in the
    /// new entry's provenance set before the entry becomes observable to
    /// walkers.
    fn admit(&self, tx: Bytes, info: TxInfo) -> Result<(), MempoolError>;

    /// Signal that is `true` whenever the list is non-empty.
    fn txs_ready(&self) -> watch::Receiver<bool>;

    /// The first element of the list, if any.
    fn front(&self) -> Option<Self::Entry>;
}

/// A handle to one element of the mempool's transaction list.
///
/// Handles stay valid after the element is evicted from the list; only
/// [`TxEntry::next`] changes behavior (it returns `None`, telling the walker
/// to restart from the front).
pub trait TxEntry: Clone + Send + Sync + 'static {
    /// The raw transaction payload.
    fn tx(&self) -> &Bytes;

    /// Block height at the time the transaction was admitted.
    fn height(&self) -> u64;

    /// Whether the transaction was first shown to us by a persistent peer.
    fn from_persistent(&self) -> bool;

    /// Whether the peer holding numeric ID `id` is known to already have
    /// this transaction.
    fn seen_from(&self, id: u16) -> bool;

    /// Signal that is `true` once a successor is linked or this element has
    /// been removed from the list.
    fn next_ready(&self) -> watch::Receiver<bool>;

    /// The successor element. `None` means this element was removed
    /// mid-walk and the walker must restart from the front.
    fn next(&self) -> Option<Self>;
}

/// Tunables of the gossip subsystem.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct GossipConfig {
    /// Master switch. When false, broadcast tasks exit as soon as they are
    /// spawned and this node only ever receives.
    pub broadcast: bool,
    /// When true, only peers marked persistent get a broadcast task.
    pub only_persistent: bool,
    /// When true, transactions that originated from a persistent peer are
    /// not forwarded at all.
    pub broadcast_from_non_persistent: bool,
    /// Capacity of the shared ingress queue, in packets.
    pub ingress_queue_capacity: usize,
    /// How long a broadcaster sleeps when a peer lags, lacks state, or has a
    /// full output buffer.
    pub peer_catchup_sleep_ms: u64,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            broadcast: true,
            only_persistent: false,
            broadcast_from_non_persistent: false,
            ingress_queue_capacity: 200_000,
            peer_catchup_sleep_ms: 100,
        }
    }
}

/// A frame handed to the ingress queue by the transport. Owned by the queue
/// from enqueue until the consumer is done with it.
pub struct IngressPacket<P> {
    pub channel_id: u8,
    pub src: P,
    pub msg_bytes: Bytes,
}

/// Dependencies shared by every task of the subsystem.
pub(crate) struct Gossip<M, S: Switch> {
    pub mempool: Arc<M>,
    pub switch: Arc<S>,
    pub config: GossipConfig,
    pub ids: PeerIds,
    pub started: AtomicBool,
    pub stop: watch::Receiver<bool>,
    pub active_broadcasts: AtomicUsize,
}

impl<M, S: Switch> Gossip<M, S> {
    pub fn new(
        mempool: Arc<M>,
        switch: Arc<S>,
        config: GossipConfig,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            mempool,
            switch,
            config,
            ids: PeerIds::new(),
            started: AtomicBool::new(false),
            stop,
            active_broadcasts: AtomicUsize::new(0),
        }
    }

    /// True between a successful `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire) && !*self.stop.borrow()
    }
}
