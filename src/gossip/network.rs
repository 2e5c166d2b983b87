// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire messages exchanged on the mempool channel.
//!
//! A frame is a single-byte variant tag followed by the variant payload.
//! The tag keeps the envelope self-describing so new variants can be added
//! without breaking peers that do not know them: an unknown tag decodes to
//! [`CodecError::UnknownTag`], which the ingress path logs and drops without
//! tearing down the connection.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

/// Logical channel the subsystem is wired to on the switch.
pub const MEMPOOL_CHANNEL_ID: u8 = 0x30;

/// Hard cap on an encoded frame.
pub const MAX_MSG_SIZE: usize = 1024 * 1024;

/// Largest transaction payload that still fits in a frame once the envelope
/// overhead is accounted for.
pub const MAX_TX_SIZE: usize = MAX_MSG_SIZE - 8;

const TX_MSG_TAG: u8 = 0x01;

/// Descriptor the reactor advertises to the switch for its channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChannelDescriptor {
    pub id: u8,
    pub priority: usize,
}

/// A message on the mempool channel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GossipMessage {
    Tx(TxMessage),
}

/// Carries one raw transaction.
#[derive(Clone, Eq, PartialEq)]
pub struct TxMessage {
    pub tx: Bytes,
}

impl fmt::Debug for TxMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[TxMessage {}]", self)
    }
}

impl fmt::Display for TxMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.tx.iter().take(8) {
            write!(f, "{:02x}", byte)?;
        }
        if self.tx.len() > 8 {
            write!(f, "..")?;
        }
        write!(f, " ({} bytes)", self.tx.len())
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message exceeds maximum size ({size} > {max})")]
    OversizeFrame { size: usize, max: usize },
    #[error("empty message frame")]
    EmptyFrame,
    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),
}

impl CodecError {
    /// Protocol faults disconnect the sender; unknown tags are tolerated for
    /// forward compatibility.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CodecError::UnknownTag(_))
    }
}

pub fn encode_msg(msg: &GossipMessage) -> Bytes {
    match msg {
        GossipMessage::Tx(tx_msg) => {
            let mut buf = BytesMut::with_capacity(1 + tx_msg.tx.len());
            buf.put_u8(TX_MSG_TAG);
            buf.extend_from_slice(&tx_msg.tx);
            buf.freeze()
        }
    }
}

pub fn decode_msg(msg_bytes: Bytes) -> Result<GossipMessage, CodecError> {
    if msg_bytes.len() > MAX_MSG_SIZE {
        return Err(CodecError::OversizeFrame {
            size: msg_bytes.len(),
            max: MAX_MSG_SIZE,
        });
    }
    match msg_bytes.first() {
        None => Err(CodecError::EmptyFrame),
        Some(&TX_MSG_TAG) => Ok(GossipMessage::Tx(TxMessage {
            tx: msg_bytes.slice(1..),
        })),
        Some(&tag) => Err(CodecError::UnknownTag(tag)),
    }
}
