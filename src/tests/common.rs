// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    gossip::network::{self, GossipMessage, TxMessage, MEMPOOL_CHANNEL_ID},
    mocks::{MockMempool, MockPeer, MockSwitch},
    GossipConfig, GossipReactor,
};
use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use tokio::runtime::Handle;

/// How long `wait_until` polls before giving up. Generous so that slow CI
/// machines do not produce flakes.
const WAIT_BUDGET: Duration = Duration::from_secs(5);

/// How long negative assertions ("nothing was sent") observe the system.
/// A handful of 100 ms broadcaster retry cycles fit inside.
const SETTLE: Duration = Duration::from_millis(350);

/// A reactor wired to mock collaborators, running on the test runtime.
pub struct TestNode {
    pub reactor: GossipReactor<MockMempool, MockSwitch>,
    pub mempool: Arc<MockMempool>,
    pub switch: Arc<MockSwitch>,
}

impl TestNode {
    pub fn start(config: GossipConfig) -> Self {
        let mempool = Arc::new(MockMempool::default());
        let switch = Arc::new(MockSwitch::new());
        let reactor = GossipReactor::new(
            config,
            mempool.clone(),
            switch.clone(),
            Handle::current(),
        );
        reactor.start().unwrap();
        Self {
            reactor,
            mempool,
            switch,
        }
    }

    pub fn start_default() -> Self {
        Self::start(GossipConfig::default())
    }

    /// Adds a peer that already reports `height`.
    pub fn connect(&self, id: &str, height: u64) -> MockPeer {
        let peer = MockPeer::with_height(id, height);
        self.reactor.add_peer(peer.clone());
        peer
    }

    /// Pushes one transaction frame from `peer` through the receive entry
    /// point, as the switch would.
    pub async fn deliver_tx(&self, peer: &MockPeer, tx: &[u8]) {
        self.deliver_frame(peer, tx_frame(tx)).await;
    }

    pub async fn deliver_frame(&self, peer: &MockPeer, frame: Bytes) {
        self.reactor
            .receive(MEMPOOL_CHANNEL_ID, peer.clone(), frame)
            .await
            .unwrap();
    }
}

/// The encoded frame `tx` travels in.
pub fn tx_frame(tx: &[u8]) -> Bytes {
    network::encode_msg(&GossipMessage::Tx(TxMessage {
        tx: Bytes::copy_from_slice(tx),
    }))
}

/// Polls `condition` until it holds or the budget runs out.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_BUDGET;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Lets the reactor run long enough that an expected non-event would have
/// happened.
pub async fn settle() {
    tokio::time::sleep(SETTLE).await;
}
