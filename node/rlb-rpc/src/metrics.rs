// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Per-crate metrics: a small set of counters and gauges registered into
//! a shared [`prometheus_client::registry::Registry`].

use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Debug, Default)]
pub struct RpcMetrics {
    /// Calls currently awaiting a response.
    pub pending_calls: Gauge,
    /// Calls that failed because zero subscribers received the publish.
    pub no_such_peer_total: Counter,
    /// Calls that timed out waiting for a response.
    pub timeout_total: Counter,
}

impl RpcMetrics {
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "rpc_pending_calls",
            "Calls currently awaiting a response",
            metrics.pending_calls.clone(),
        );
        registry.register(
            "rpc_no_such_peer_total",
            "Calls that found zero subscribers on the peer's request channel",
            metrics.no_such_peer_total.clone(),
        );
        registry.register(
            "rpc_timeout_total",
            "Calls that timed out before a response arrived",
            metrics.timeout_total.clone(),
        );
        metrics
    }
}
