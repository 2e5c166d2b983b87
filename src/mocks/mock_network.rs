// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::gossip::types::{Peer, PeerState, Switch};
use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::watch;

/// A scripted peer: records everything sent to it, and lets tests control
/// its height, liveness, and whether its output buffer accepts messages.
#[derive(Clone)]
pub struct MockPeer {
    inner: Arc<MockPeerInner>,
}

struct MockPeerInner {
    id: String,
    running: AtomicBool,
    accept_sends: AtomicBool,
    quit: watch::Sender<bool>,
    state: Mutex<Option<Arc<MockPeerState>>>,
    sent: Mutex<Vec<(u8, Bytes)>>,
}

struct MockPeerState {
    height: AtomicU64,
}

impl PeerState for MockPeerState {
    fn height(&self) -> u64 {
        self.height.load(Ordering::Acquire)
    }
}

impl MockPeer {
    /// A live peer with no peer-state installed yet.
    pub fn new(id: &str) -> Self {
        let (quit, _) = watch::channel(false);
        Self {
            inner: Arc::new(MockPeerInner {
                id: id.to_string(),
                running: AtomicBool::new(true),
                accept_sends: AtomicBool::new(true),
                quit,
                state: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A live peer that already reports `height`.
    pub fn with_height(id: &str, height: u64) -> Self {
        let peer = Self::new(id);
        peer.set_height(height);
        peer
    }

    /// Installs the peer state if missing and moves its reported height.
    pub fn set_height(&self, height: u64) {
        let mut state = self.inner.state.lock();
        match state.as_ref() {
            Some(state) => state.height.store(height, Ordering::Release),
            None => {
                *state = Some(Arc::new(MockPeerState {
                    height: AtomicU64::new(height),
                }));
            }
        }
    }

    /// Scripts whether `try_send` reports the output buffer as writable.
    pub fn set_accept_sends(&self, accept: bool) {
        self.inner.accept_sends.store(accept, Ordering::Release);
    }

    /// Simulates connection teardown.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.quit.send_replace(true);
    }

    /// Everything successfully sent to this peer, in order.
    pub fn sent(&self) -> Vec<(u8, Bytes)> {
        self.inner.sent.lock().clone()
    }
}

impl Peer for MockPeer {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn try_send(&self, channel_id: u8, payload: Bytes) -> bool {
        if !self.inner.accept_sends.load(Ordering::Acquire) {
            return false;
        }
        self.inner.sent.lock().push((channel_id, payload));
        true
    }

    fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    fn quit(&self) -> watch::Receiver<bool> {
        self.inner.quit.subscribe()
    }

    fn state(&self) -> Option<Arc<dyn PeerState>> {
        self.inner
            .state
            .lock()
            .clone()
            .map(|state| state as Arc<dyn PeerState>)
    }
}

/// A switch that tracks persistence classification and records peers it was
/// asked to stop.
#[derive(Default)]
pub struct MockSwitch {
    persistent: Mutex<HashSet<String>>,
    stopped: Mutex<Vec<(String, String)>>,
}

impl MockSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_persistent(&self, peer_id: &str) {
        self.persistent.lock().insert(peer_id.to_string());
    }

    /// `(peer id, error)` pairs from `stop_peer_for_error`, in order.
    pub fn stopped_peers(&self) -> Vec<(String, String)> {
        self.stopped.lock().clone()
    }
}

impl Switch for MockSwitch {
    type Peer = MockPeer;

    fn is_persistent(&self, peer: &MockPeer) -> bool {
        self.persistent.lock().contains(peer.id())
    }

    fn stop_peer_for_error(&self, peer: &MockPeer, err: anyhow::Error) {
        self.stopped
            .lock()
            .push((peer.id().to_string(), err.to_string()));
        peer.stop();
    }
}
