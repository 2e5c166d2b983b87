// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Long-lived routines of the gossip subsystem: the serial ingress consumer
//! and the per-peer broadcast task.

use crate::{
    counters,
    gossip::{
        network::{self, GossipMessage, TxMessage, MEMPOOL_CHANNEL_ID},
        types::{Gossip, IngressPacket, Mempool, MempoolError, Peer, Switch, TxEntry, TxInfo},
    },
};
use futures::{
    channel::mpsc,
    future::{select, Either},
    pin_mut, StreamExt,
};
use log::{debug, error, info};
use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};
use tokio::sync::watch;

/// Drains the shared ingress queue until it is closed and empty.
///
/// Runs as a single task so admission into the mempool is serialized no
/// matter how many peers are pushing at once.
pub(crate) async fn run_ingress<M, S>(
    gossip: Arc<Gossip<M, S>>,
    mut packets: mpsc::Receiver<IngressPacket<S::Peer>>,
) where
    M: Mempool,
    S: Switch,
{
    debug!("[mempool gossip] starting ingress routine");
    while let Some(packet) = packets.next().await {
        counters::PENDING_INGRESS_PACKETS.dec();
        process_ingress_packet(&gossip, packet);
    }
    debug!("[mempool gossip] ingress routine terminated");
}

fn process_ingress_packet<M, S>(gossip: &Gossip<M, S>, packet: IngressPacket<S::Peer>)
where
    M: Mempool,
    S: Switch,
{
    let IngressPacket {
        channel_id,
        src,
        msg_bytes,
    } = packet;

    let msg = match network::decode_msg(msg_bytes) {
        Ok(msg) => msg,
        Err(err) if err.is_fatal() => {
            error!(
                "[mempool gossip] error decoding message from {} on channel {:#04x}: {}",
                src.id(),
                channel_id,
                err
            );
            gossip.switch.stop_peer_for_error(&src, err.into());
            return;
        }
        Err(err) => {
            // forward-compatible variant we do not understand yet
            error!(
                "[mempool gossip] dropping message from {}: {}",
                src.id(),
                err
            );
            return;
        }
    };

    match msg {
        GossipMessage::Tx(tx_msg) => {
            counters::RECEIVED_TXNS.with_label_values(&[src.id()]).inc();
            let info = TxInfo {
                sender_id: gossip.ids.get_for_peer(src.id()),
                from_persistent: gossip.switch.is_persistent(&src),
            };
            if let Err(err) = gossip.mempool.admit(tx_msg.tx, info) {
                if err == MempoolError::TxInCache {
                    counters::DUPLICATE_TXNS.with_label_values(&[src.id()]).inc();
                }
                info!(
                    "[mempool gossip] could not admit transaction from {}: {}",
                    src.id(),
                    err
                );
            }
            // broadcasting happens from the per-peer tasks
        }
    }
}

/// Waits until `rx` observes `true`. Returns false if the sender side went
/// away first; callers treat both as the signal having fired.
async fn flag_raised(rx: &mut watch::Receiver<bool>) -> bool {
    rx.wait_for(|flag| *flag).await.is_ok()
}

struct BroadcastSlot<'a, M, S: Switch>(&'a Gossip<M, S>);

impl<'a, M, S: Switch> BroadcastSlot<'a, M, S> {
    fn claim(gossip: &'a Gossip<M, S>) -> Self {
        gossip.active_broadcasts.fetch_add(1, Ordering::AcqRel);
        Self(gossip)
    }
}

impl<M, S: Switch> Drop for BroadcastSlot<'_, M, S> {
    fn drop(&mut self) {
        self.0.active_broadcasts.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Streams pending transactions to one peer, in mempool list order.
///
/// The task owns a private cursor into the mempool list. Elements are
/// skipped when the peer already holds them (its numeric ID is in the
/// element's provenance set) or when the persistent-origin filter applies;
/// a lagging or startup-racing peer and a full output buffer are retried
/// after a short sleep without advancing the cursor. The task exits when
/// the peer or the reactor stops.
pub(crate) async fn broadcast_txs_to_peer<M, S>(gossip: Arc<Gossip<M, S>>, peer: S::Peer)
where
    M: Mempool,
    S: Switch,
{
    if !gossip.config.broadcast
        || (gossip.config.only_persistent && !gossip.switch.is_persistent(&peer))
    {
        return;
    }
    let _slot = BroadcastSlot::claim(&gossip);

    let peer_id = gossip.ids.get_for_peer(peer.id());
    let catchup_sleep = Duration::from_millis(gossip.config.peer_catchup_sleep_ms);
    let mut reactor_stop = gossip.stop.clone();
    let mut peer_quit = peer.quit();
    let mut txs_ready = gossip.mempool.txs_ready();
    let mut cursor: Option<M::Entry> = None;

    loop {
        // peer_quit and reactor_stop may fire while we are parked on another
        // signal; this check catches them on the way around
        if !gossip.is_running() || !peer.is_running() {
            return;
        }

        let entry = match cursor.take() {
            Some(entry) => entry,
            None => {
                // the cursor points nowhere, either at startup or because the
                // element under it was garbage-collected. Wait for the list
                // to be non-empty and restart from the front.
                let ready = flag_raised(&mut txs_ready);
                let peer_stopped = flag_raised(&mut peer_quit);
                let reactor_stopped = flag_raised(&mut reactor_stop);
                pin_mut!(ready, peer_stopped, reactor_stopped);
                match select(ready, select(peer_stopped, reactor_stopped)).await {
                    Either::Left((true, _)) => match gossip.mempool.front() {
                        Some(entry) => entry,
                        None => continue,
                    },
                    Either::Left((false, _)) | Either::Right(_) => return,
                }
            }
        };

        // when configured to forward only organically-received transactions,
        // anything a persistent peer showed us moves past without a send
        let deliver = !(gossip.config.broadcast_from_non_persistent && entry.from_persistent());
        if deliver {
            let peer_state = match peer.state() {
                Some(state) => state,
                None => {
                    // Another subsystem installs the peer state and the order
                    // the switch calls add_peer across subsystems is not
                    // fixed, so right after a connect the bag can still be
                    // empty. Wait a little and retry.
                    tokio::time::sleep(catchup_sleep).await;
                    cursor = Some(entry);
                    continue;
                }
            };
            if peer_state.height() < entry.height().saturating_sub(1) {
                // allow a lag of one block; anything further behind would
                // reject the transaction anyway
                tokio::time::sleep(catchup_sleep).await;
                cursor = Some(entry);
                continue;
            }

            // make sure the peer has not already shown us this transaction
            if !entry.seen_from(peer_id) {
                let msg = GossipMessage::Tx(TxMessage {
                    tx: entry.tx().clone(),
                });
                if !peer.try_send(MEMPOOL_CHANNEL_ID, network::encode_msg(&msg)) {
                    // output buffer full; retry the same element
                    tokio::time::sleep(catchup_sleep).await;
                    cursor = Some(entry);
                    continue;
                }
            }
        }

        let mut next_ready = entry.next_ready();
        let advanced = flag_raised(&mut next_ready);
        let peer_stopped = flag_raised(&mut peer_quit);
        let reactor_stopped = flag_raised(&mut reactor_stop);
        pin_mut!(advanced, peer_stopped, reactor_stopped);
        match select(advanced, select(peer_stopped, reactor_stopped)).await {
            Either::Left((true, _)) => {
                // None here means the element was evicted mid-walk; the
                // cursor check at the top restarts from the front
                cursor = entry.next();
            }
            Either::Left((false, _)) | Either::Right(_) => return,
        }
    }
}
