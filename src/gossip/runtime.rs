// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bootstrap of the gossip subsystem on its own runtime.

use crate::gossip::{
    reactor::GossipReactor,
    types::{GossipConfig, Mempool, Switch},
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

/// Creates a dedicated tokio runtime, builds the reactor on it, and starts
/// the ingress consumer. The caller wires the returned reactor into the
/// switch and keeps the runtime alive for as long as the subsystem runs.
pub fn bootstrap<M, S>(
    config: GossipConfig,
    mempool: Arc<M>,
    switch: Arc<S>,
) -> Result<(Runtime, GossipReactor<M, S>)>
where
    M: Mempool,
    S: Switch,
{
    let runtime = Builder::new_multi_thread()
        .thread_name("mempool-gossip")
        .enable_all()
        .build()
        .context("[mempool gossip] failed to create runtime")?;
    let reactor = GossipReactor::new(config, mempool, switch, runtime.handle().clone());
    reactor.start()?;
    Ok((runtime, reactor))
}
