// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::envelope::{RpcRequest, RpcResponse};
use crate::handler::RpcHandler;
use crate::metrics::RpcMetrics;
use crate::Error;
use rlb_datastore::{keys, Datastore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

type PendingMap = Mutex<HashMap<String, flume::Sender<Result<Value, String>>>>;

/// A pub/sub RPC node: subscribes to its own request and result channels
/// and exposes `call` to reach a peer's handler.
pub struct RpcNode<D: Datastore + 'static> {
    datastore: Arc<D>,
    pool_id: String,
    node_id: String,
    default_timeout: Duration,
    pending: Arc<PendingMap>,
    shutdown: Arc<Notify>,
    metrics: Arc<RpcMetrics>,
}

impl<D: Datastore + 'static> RpcNode<D> {
    /// Subscribes to `{prefix}:{id}` and `{prefix}:{id}:result` and spawns
    /// the background task that serves incoming requests with `handler`
    /// and completes pending outbound calls from incoming responses.
    pub async fn new(
        datastore: Arc<D>,
        pool_id: impl Into<String>,
        node_id: impl Into<String>,
        handler: Arc<dyn RpcHandler>,
    ) -> Result<Self, Error> {
        Self::with_timeout(datastore, pool_id, node_id, handler, DEFAULT_TIMEOUT).await
    }

    pub async fn with_timeout(
        datastore: Arc<D>,
        pool_id: impl Into<String>,
        node_id: impl Into<String>,
        handler: Arc<dyn RpcHandler>,
        default_timeout: Duration,
    ) -> Result<Self, Error> {
        let pool_id = pool_id.into();
        let node_id = node_id.into();
        let request_channel = keys::rpc_request_channel(&pool_id, &node_id);
        let result_channel = keys::rpc_result_channel(&pool_id, &node_id);

        let requests = datastore.subscribe(&request_channel).await?;
        let results = datastore.subscribe(&result_channel).await?;

        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = Arc::new(Notify::new());
        let metrics = Arc::new(RpcMetrics::default());

        tokio::spawn(serve(
            datastore.clone(),
            pool_id.clone(),
            node_id.clone(),
            handler,
            pending.clone(),
            requests,
            results,
            shutdown.clone(),
        ));

        Ok(Self {
            datastore,
            pool_id,
            node_id,
            default_timeout,
            pending,
            shutdown,
            metrics,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn metrics(&self) -> Arc<RpcMetrics> {
        self.metrics.clone()
    }

    /// Calls `peer_id`'s handler with `payload`, waiting up to `timeout`
    /// (or this node's default) for a response.
    pub async fn call(
        &self,
        peer_id: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, Error> {
        let correlation_id = rlb_id::generate_id();
        let request = RpcRequest {
            id: correlation_id.clone(),
            caller: self.node_id.clone(),
            payload,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| Error::Decode(format!("failed to encode request: {e}")))?;

        let channel = keys::rpc_request_channel(&self.pool_id, peer_id);
        let delivered = self.datastore.publish(&channel, &body).await?;
        if delivered == 0 {
            debug!(peer_id, "no subscriber on request channel");
            self.metrics.no_such_peer_total.inc();
            return Err(Error::NoSuchPeer);
        }

        let (tx, rx) = flume::bounded(1);
        self.pending
            .lock()
            .unwrap()
            .insert(correlation_id.clone(), tx);
        self.metrics.pending_calls.inc();

        let timeout = timeout.unwrap_or(self.default_timeout);
        let result = tokio::time::timeout(timeout, rx.recv_async()).await;

        self.pending.lock().unwrap().remove(&correlation_id);
        self.metrics.pending_calls.dec();

        match result {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(handler_err))) => Err(Error::HandlerError(handler_err)),
            Ok(Err(_disconnected)) => Err(Error::CallTimeout),
            Err(_elapsed) => {
                self.metrics.timeout_total.inc();
                Err(Error::CallTimeout)
            }
        }
    }

    /// Stops serving requests and completing calls. In-flight calls time
    /// out normally.
    pub fn disconnect(&self) {
        self.shutdown.notify_waiters();
    }
}

#[allow(clippy::too_many_arguments)]
async fn serve<D: Datastore + 'static>(
    datastore: Arc<D>,
    pool_id: String,
    node_id: String,
    handler: Arc<dyn RpcHandler>,
    pending: Arc<PendingMap>,
    requests: rlb_datastore::Subscription,
    results: rlb_datastore::Subscription,
    shutdown: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!(node_id, "rpc node shutting down");
                return;
            }
            msg = requests.recv() => {
                let Some((_, body)) = msg else { return };
                handle_request(&datastore, &pool_id, &handler, &body).await;
            }
            msg = results.recv() => {
                let Some((_, body)) = msg else { return };
                handle_response(&pending, &body);
            }
        }
    }
}

async fn handle_request<D: Datastore + 'static>(
    datastore: &Arc<D>,
    pool_id: &str,
    handler: &Arc<dyn RpcHandler>,
    body: &str,
) {
    let request: RpcRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(err) => {
            warn!(%err, "failed to decode inbound RPC request");
            return;
        }
    };

    let response = match handler.handle(request.payload).await {
        Ok(value) => RpcResponse::ok(request.id, value),
        Err(err) => RpcResponse::err(request.id, err),
    };

    let wire = match serde_json::to_string(&response) {
        Ok(w) => w,
        Err(err) => {
            warn!(%err, "failed to encode RPC response");
            return;
        }
    };

    let result_channel = keys::rpc_result_channel(pool_id, &request.caller);
    if let Err(err) = datastore.publish(&result_channel, &wire).await {
        warn!(%err, "failed to publish RPC response");
    }
}

fn handle_response(pending: &Arc<PendingMap>, body: &str) {
    let response: RpcResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(err) => {
            warn!(%err, "failed to decode inbound RPC response");
            return;
        }
    };

    let sender = pending.lock().unwrap().remove(&response.id);
    let Some(sender) = sender else {
        // Late response for a call we already timed out, or a response for
        // someone else's correlation id on a shared channel; both are
        // dropped silently.
        return;
    };

    let outcome = match response.error {
        Some(err) => Err(err),
        None => Ok(response.payload.unwrap_or(Value::Null)),
    };
    let _ = sender.send(outcome);
}
