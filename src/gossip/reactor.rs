// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! The reactor facade: lifecycle, peer hooks, and the receive entry point
//! the switch drives.

use crate::{
    counters,
    gossip::{
        network::{ChannelDescriptor, MEMPOOL_CHANNEL_ID},
        tasks,
        types::{
            Gossip, GossipConfig, IngressPacket, Mempool, MempoolError, Peer, Switch, TxInfo,
            UNKNOWN_PEER_ID,
        },
    },
};
use anyhow::{bail, ensure, Result};
use bytes::Bytes;
use futures::{channel::mpsc, SinkExt};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::{atomic::Ordering, Arc};
use tokio::{runtime::Handle, sync::watch};

/// Handles mempool transaction broadcasting amongst peers on one logical
/// channel of the switch.
///
/// The reactor keeps a map from peer identity to a compact numeric ID so
/// that transactions are not gossiped back to the peers they were received
/// from. Peers must be added after [`start`](GossipReactor::start); the
/// switch guarantees that ordering.
pub struct GossipReactor<M, S: Switch> {
    gossip: Arc<Gossip<M, S>>,
    executor: Handle,
    stop_tx: watch::Sender<bool>,
    ingress_tx: Mutex<Option<mpsc::Sender<IngressPacket<S::Peer>>>>,
    ingress_rx: Mutex<Option<mpsc::Receiver<IngressPacket<S::Peer>>>>,
}

impl<M, S> GossipReactor<M, S>
where
    M: Mempool,
    S: Switch,
{
    pub fn new(config: GossipConfig, mempool: Arc<M>, switch: Arc<S>, executor: Handle) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (ingress_tx, ingress_rx) = mpsc::channel(config.ingress_queue_capacity);
        Self {
            gossip: Arc::new(Gossip::new(mempool, switch, config, stop_rx)),
            executor,
            stop_tx,
            ingress_tx: Mutex::new(Some(ingress_tx)),
            ingress_rx: Mutex::new(Some(ingress_rx)),
        }
    }

    /// The channels this reactor serves, advertised to the switch.
    pub fn channel_descriptors(&self) -> Vec<ChannelDescriptor> {
        vec![ChannelDescriptor {
            id: MEMPOOL_CHANNEL_ID,
            priority: 5,
        }]
    }

    /// Spawns the ingress consumer. Broadcasting stays off if the config
    /// disables it; receiving works either way.
    pub fn start(&self) -> Result<()> {
        ensure!(
            !self.gossip.started.swap(true, Ordering::AcqRel),
            "gossip reactor started twice"
        );
        if !self.gossip.config.broadcast {
            info!("[mempool gossip] transaction broadcasting is disabled");
        }
        let ingress_rx = self
            .ingress_rx
            .lock()
            .take()
            .expect("ingress receiver is taken only here");
        self.executor
            .spawn(tasks::run_ingress(self.gossip.clone(), ingress_rx));
        Ok(())
    }

    /// Closes the ingress queue and flips the shared stop signal; every
    /// broadcast task terminates on its next select.
    pub fn stop(&self) {
        if let Some(mut ingress_tx) = self.ingress_tx.lock().take() {
            ingress_tx.close_channel();
        }
        let _ = self.stop_tx.send(true);
    }

    pub fn is_running(&self) -> bool {
        self.gossip.is_running()
    }

    /// Reserves a numeric ID for the peer and spawns its broadcast task.
    pub fn add_peer(&self, peer: S::Peer) {
        self.gossip.ids.reserve_for_peer(peer.id());
        self.executor
            .spawn(tasks::broadcast_txs_to_peer(self.gossip.clone(), peer));
    }

    /// Reclaims the peer's numeric ID. The broadcast task notices the peer
    /// is gone on its next select and exits on its own.
    pub fn remove_peer(&self, peer: &S::Peer, reason: &str) {
        debug!("[mempool gossip] removing peer {}: {}", peer.id(), reason);
        self.gossip.ids.reclaim(peer.id());
    }

    /// Entry point the switch calls for every inbound frame on the mempool
    /// channel. Blocks while the ingress queue is full, back-pressuring the
    /// transport; fails once the reactor has stopped.
    pub async fn receive(&self, channel_id: u8, src: S::Peer, msg_bytes: Bytes) -> Result<()> {
        let ingress_tx = self.ingress_tx.lock().as_ref().cloned();
        let mut ingress_tx = match ingress_tx {
            Some(ingress_tx) => ingress_tx,
            None => bail!("gossip reactor is stopped"),
        };
        ingress_tx
            .send(IngressPacket {
                channel_id,
                src,
                msg_bytes,
            })
            .await?;
        counters::PENDING_INGRESS_PACKETS.inc();
        Ok(())
    }

    /// Admits a locally submitted transaction (RPC and friends), attributed
    /// to [`UNKNOWN_PEER_ID`]. The per-peer tasks pick it up like any other
    /// pending transaction.
    pub fn submit_tx(&self, tx: Bytes) -> Result<(), MempoolError> {
        self.gossip.mempool.admit(
            tx,
            TxInfo {
                sender_id: UNKNOWN_PEER_ID,
                from_persistent: false,
            },
        )
    }

    /// Number of live broadcast tasks; drains to zero after [`stop`].
    ///
    /// [`stop`]: GossipReactor::stop
    pub fn active_broadcasts(&self) -> usize {
        self.gossip.active_broadcasts.load(Ordering::Acquire)
    }
}
