// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::gossip::{
    network::MAX_TX_SIZE,
    types::{Mempool, MempoolError, TxEntry, TxInfo},
};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::watch;

/// An in-memory mempool with the list semantics the broadcaster depends on:
/// insertion-ordered linked elements, a non-empty signal, per-element
/// next-ready signals, and eviction that detaches an element mid-walk.
///
/// Admission performs only the checks the reactor observes through
/// [`MempoolError`]: a duplicate cache, a size cap, and a capacity cap.
pub struct MockMempool {
    inner: Mutex<ListInner>,
    txs_ready: watch::Sender<bool>,
    capacity: usize,
    /// height stamped on entries at admission; tests move it
    height: AtomicU64,
}

struct ListInner {
    head: Option<Arc<TxNode>>,
    tail: Option<Arc<TxNode>>,
    len: usize,
    cache: HashSet<Bytes>,
}

struct TxNode {
    tx: Bytes,
    height: u64,
    from_persistent: bool,
    senders: RwLock<HashSet<u16>>,
    next: Mutex<Option<Arc<TxNode>>>,
    next_ready: watch::Sender<bool>,
    removed: AtomicBool,
}

#[derive(Clone)]
pub struct MockTxEntry(Arc<TxNode>);

impl Default for MockMempool {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl MockMempool {
    pub fn new(capacity: usize) -> Self {
        let (txs_ready, _) = watch::channel(false);
        Self {
            inner: Mutex::new(ListInner {
                head: None,
                tail: None,
                len: 0,
                cache: HashSet::new(),
            }),
            txs_ready,
            capacity,
            height: AtomicU64::new(1),
        }
    }

    /// Sets the height stamped on subsequently admitted transactions.
    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts the entry holding `tx`, detaching it from the list. Walkers
    /// parked on the element observe next-ready and restart from the front.
    pub fn remove(&self, tx: &[u8]) {
        let mut inner = self.inner.lock();
        let mut prev: Option<Arc<TxNode>> = None;
        let mut cur = inner.head.clone();
        while let Some(node) = cur {
            if node.tx.as_ref() == tx {
                let successor = node.next.lock().clone();
                match &prev {
                    Some(prev) => *prev.next.lock() = successor.clone(),
                    None => inner.head = successor.clone(),
                }
                if successor.is_none() {
                    inner.tail = prev;
                }
                node.removed.store(true, Ordering::Release);
                *node.next.lock() = None;
                node.next_ready.send_replace(true);
                inner.len -= 1;
                if inner.len == 0 {
                    self.txs_ready.send_replace(false);
                }
                return;
            }
            cur = node.next.lock().clone();
            prev = Some(node);
        }
    }
}

impl Mempool for MockMempool {
    type Entry = MockTxEntry;

    fn admit(&self, tx: Bytes, info: TxInfo) -> Result<(), MempoolError> {
        if tx.len() > MAX_TX_SIZE {
            return Err(MempoolError::TxTooLarge {
                size: tx.len(),
                max: MAX_TX_SIZE,
            });
        }
        let mut inner = self.inner.lock();
        if inner.len >= self.capacity {
            return Err(MempoolError::MempoolIsFull {
                size: inner.len,
                capacity: self.capacity,
            });
        }
        if !inner.cache.insert(tx.clone()) {
            return Err(MempoolError::TxInCache);
        }

        let mut senders = HashSet::new();
        senders.insert(info.sender_id);
        let (next_ready, _) = watch::channel(false);
        let node = Arc::new(TxNode {
            tx,
            height: self.height.load(Ordering::Acquire),
            from_persistent: info.from_persistent,
            senders: RwLock::new(senders),
            next: Mutex::new(None),
            next_ready,
            removed: AtomicBool::new(false),
        });

        match inner.tail.take() {
            Some(tail) => {
                *tail.next.lock() = Some(node.clone());
                tail.next_ready.send_replace(true);
                inner.tail = Some(node);
            }
            None => {
                inner.head = Some(node.clone());
                inner.tail = Some(node);
            }
        }
        inner.len += 1;
        self.txs_ready.send_replace(true);
        Ok(())
    }

    fn txs_ready(&self) -> watch::Receiver<bool> {
        self.txs_ready.subscribe()
    }

    fn front(&self) -> Option<MockTxEntry> {
        self.inner.lock().head.clone().map(MockTxEntry)
    }
}

impl TxEntry for MockTxEntry {
    fn tx(&self) -> &Bytes {
        &self.0.tx
    }

    fn height(&self) -> u64 {
        self.0.height
    }

    fn from_persistent(&self) -> bool {
        self.0.from_persistent
    }

    fn seen_from(&self, id: u16) -> bool {
        self.0.senders.read().contains(&id)
    }

    fn next_ready(&self) -> watch::Receiver<bool> {
        self.0.next_ready.subscribe()
    }

    fn next(&self) -> Option<MockTxEntry> {
        if self.0.removed.load(Ordering::Acquire) {
            return None;
        }
        self.0.next.lock().clone().map(MockTxEntry)
    }
}
