// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Requests handled by this node's own consumer because it was the
    /// lowest-loaded (or the only) candidate.
    pub local_total: Counter,
    /// Requests routed to a peer over the RPC transport.
    pub remote_total: Counter,
    /// Requests that attempted a peer route and fell back to local after
    /// an RPC failure.
    pub fallback_total: Counter,
}

impl DispatchMetrics {
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "dispatch_local_total",
            "Requests served by this node's own consumer",
            metrics.local_total.clone(),
        );
        registry.register(
            "dispatch_remote_total",
            "Requests routed to a peer over RPC",
            metrics.remote_total.clone(),
        );
        registry.register(
            "dispatch_fallback_total",
            "Requests that fell back to local after an RPC failure",
            metrics.fallback_total.clone(),
        );
        metrics
    }
}
