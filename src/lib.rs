// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Transaction gossip for the mempool.
//!
//! This crate owns the peer-facing side of the mempool: it receives
//! transactions that other peers push to us on the mempool channel, admits
//! them to the local mempool with source attribution, and runs one broadcast
//! task per connected peer that streams pending transactions outward. A
//! transaction is never echoed back to a peer it was received from, and is
//! withheld from peers that are too far behind in block height to accept it.
//!
//! The mempool itself and the network switch are collaborators reached
//! through the [`Mempool`] and [`Switch`] traits; their internals live
//! elsewhere.

pub mod counters;
mod gossip;

#[cfg(any(test, feature = "fuzzing"))]
pub mod mocks;
#[cfg(test)]
mod tests;

pub use gossip::{
    network::{
        decode_msg, encode_msg, ChannelDescriptor, CodecError, GossipMessage, TxMessage,
        MAX_MSG_SIZE, MAX_TX_SIZE, MEMPOOL_CHANNEL_ID,
    },
    reactor::GossipReactor,
    runtime::bootstrap,
    types::{
        GossipConfig, IngressPacket, Mempool, MempoolError, Peer, PeerState, Switch, TxEntry,
        TxInfo, UNKNOWN_PEER_ID,
    },
};
