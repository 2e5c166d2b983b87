// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Mock collaborators for exercising the reactor without a real node.

mod mock_mempool;
mod mock_network;

pub use mock_mempool::{MockMempool, MockTxEntry};
pub use mock_network::{MockPeer, MockSwitch};
