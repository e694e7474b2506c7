// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::metrics::DispatchMetrics;
use crate::request::{DispatchRequest, DispatchResponse};
use crate::Error;
use rlb_datastore::Datastore;
use rlb_registry::LoadRegistry;
use rlb_rpc::RpcNode;
use rlb_scheduler::{ConsumerScheduler, SchedulerConfig, Workload};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Tunables owned by the dispatcher and the components it wires together.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Load-report period and key TTL.
    pub report_interval: Duration,
    /// Per-call RPC deadline.
    pub rpc_timeout: Duration,
    pub scheduler: SchedulerConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_secs(30),
            rpc_timeout: Duration::from_secs(15),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// `consume(payload) -> response` front door: routes to the lowest-loaded
/// node in the pool, falling back to the local consumer unconditionally on
/// any RPC failure.
pub struct Dispatcher<D: Datastore + 'static, W: Workload> {
    node_id: String,
    open: AtomicBool,
    scheduler: ConsumerScheduler<W>,
    registry: LoadRegistry<D>,
    rpc: Arc<RpcNode<D>>,
    metrics: Arc<DispatchMetrics>,
}

impl<D: Datastore + 'static, W: Workload> Dispatcher<D, W> {
    /// Wires a scheduler, a load registry and an RPC node together over a
    /// shared datastore, and spawns the background task that forwards the
    /// scheduler's load-change signal to the registry.
    pub async fn new(
        datastore: Arc<D>,
        pool_id: impl Into<String>,
        node_id: impl Into<String>,
        workload: W,
        config: DispatcherConfig,
    ) -> Result<Arc<Self>, rlb_rpc::Error> {
        let pool_id = pool_id.into();
        let node_id = node_id.into();

        let scheduler = ConsumerScheduler::new(workload, config.scheduler);
        let registry = LoadRegistry::new(
            datastore.clone(),
            pool_id.clone(),
            node_id.clone(),
            config.report_interval,
        );

        let handler_scheduler = scheduler.clone();
        let handler = Arc::new(move |payload: serde_json::Value| {
            let scheduler = handler_scheduler.clone();
            async move { handle_remote_request(&scheduler, payload).await }
        });
        let rpc = Arc::new(
            RpcNode::with_timeout(
                datastore,
                pool_id,
                node_id.clone(),
                handler,
                config.rpc_timeout,
            )
            .await?,
        );

        let dispatcher = Arc::new(Self {
            node_id,
            open: AtomicBool::new(true),
            scheduler: scheduler.clone(),
            registry: registry.clone(),
            rpc,
            metrics: Arc::new(DispatchMetrics::default()),
        });

        tokio::spawn(forward_load_changes(scheduler, registry));

        Ok(dispatcher)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        self.metrics.clone()
    }

    /// `true` while the registry's datastore connection is up.
    pub fn is_online(&self) -> bool {
        self.registry.is_online()
    }

    /// Handles one request.
    pub async fn consume(&self, request: DispatchRequest) -> Result<DispatchResponse, Error> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }

        if !self.registry.is_online() {
            self.metrics.local_total.inc();
            return self.invoke_local(request).await;
        }

        let local_load = self.scheduler.load().await;
        let peer_loads = match self.registry.fetch_loads().await {
            Ok(loads) => loads,
            Err(err) => {
                warn!(%err, "failed to fetch peer loads, falling back to local consumer");
                self.metrics.local_total.inc();
                return self.invoke_local(request).await;
            }
        };

        let mut min_load = local_load;
        let mut min_peer: Option<String> = None;
        for (peer_id, load) in peer_loads {
            if peer_id == self.node_id {
                continue;
            }
            // Strict `<`: a peer only wins if it beats the current
            // minimum, so an equal load leaves `min_peer` at `None` and
            // ties go local.
            if load < min_load {
                min_load = load;
                min_peer = Some(peer_id);
            }
        }

        let Some(peer_id) = min_peer else {
            self.metrics.local_total.inc();
            return self.invoke_local(request).await;
        };

        self.metrics.remote_total.inc();
        match self.call_peer(&peer_id, &request).await {
            Ok(response) => Ok(response),
            Err(reason) => {
                debug!(peer_id, %reason, "rpc route failed, falling back to local consumer");
                self.metrics.fallback_total.inc();
                self.invoke_local(request).await
            }
        }
    }

    async fn invoke_local(&self, request: DispatchRequest) -> Result<DispatchResponse, Error> {
        self.scheduler
            .consume(request.into())
            .await
            .map(Into::into)
            .map_err(Error::from)
    }

    async fn call_peer(
        &self,
        peer_id: &str,
        request: &DispatchRequest,
    ) -> Result<DispatchResponse, String> {
        let payload = serde_json::to_value(request).map_err(|e| e.to_string())?;
        let value = self
            .rpc
            .call(peer_id, payload, None)
            .await
            .map_err(|e| e.to_string())?;
        serde_json::from_value(value).map_err(|e| e.to_string())
    }

    /// Sets `open = false`, deletes the local load key, disconnects the
    /// RPC node and closes the consumer scheduler, draining outstanding
    /// work.
    pub async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        if let Err(err) = self.registry.close().await {
            warn!(%err, "failed to delete load key on close");
        }
        self.rpc.disconnect();
        self.scheduler.close().await;
    }
}

/// The handler installed on this node's RPC channel: decodes an inbound
/// [`DispatchRequest`], hands it straight to the local scheduler and
/// re-encodes the result.
async fn handle_remote_request<W: Workload>(
    scheduler: &ConsumerScheduler<W>,
    payload: serde_json::Value,
) -> Result<serde_json::Value, String> {
    let request: DispatchRequest = serde_json::from_value(payload).map_err(|e| e.to_string())?;
    let response = scheduler
        .consume(request.into())
        .await
        .map_err(|e| e.to_string())?;
    serde_json::to_value(DispatchResponse::from(response)).map_err(|e| e.to_string())
}

async fn forward_load_changes<D: Datastore + 'static, W: Workload>(
    scheduler: ConsumerScheduler<W>,
    registry: LoadRegistry<D>,
) {
    let mut changes = scheduler.load_changes();
    loop {
        if changes.changed().await.is_err() {
            return;
        }
        let load = *changes.borrow();
        if let Err(err) = registry.report(load).await {
            warn!(%err, "failed to report load change");
        }
    }
}
