// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, register_int_gauge, IntCounterVec, IntGauge};

lazy_static! {
    /// number of transactions received over the mempool channel, by sending peer
    pub static ref RECEIVED_TXNS: IntCounterVec = register_int_counter_vec!(
        "mempool_gossip_received_txns_total",
        "Number of transactions received from each peer",
        &["peer_id"]
    )
    .unwrap();

    /// number of received transactions the mempool already held, by sending peer
    pub static ref DUPLICATE_TXNS: IntCounterVec = register_int_counter_vec!(
        "mempool_gossip_duplicate_txns_total",
        "Number of received transactions that were already in the mempool cache",
        &["peer_id"]
    )
    .unwrap();

    /// packets currently queued between the transport and the ingress consumer
    pub static ref PENDING_INGRESS_PACKETS: IntGauge = register_int_gauge!(
        "mempool_gossip_pending_ingress_packets",
        "Number of packets sitting in the ingress queue"
    )
    .unwrap();
}
