// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod network;
pub(crate) mod peer_ids;
pub mod reactor;
pub mod runtime;
pub(crate) mod tasks;
pub mod types;
