// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::RlbConfig;
use rlb_datastore::Datastore;
use rlb_dispatch::{Dispatcher, DispatchRequest, DispatchResponse};
use rlb_scheduler::Workload;
use std::sync::Arc;

/// One process in the dispatch pool: owns exactly one [`Dispatcher`], which
/// in turn owns the consumer scheduler, the RPC node and the load registry
/// it was wired from. Symmetric with every other node sharing its
/// `pool_id` — there is no leader.
pub struct Node<D: Datastore + 'static, W: Workload> {
    id: String,
    dispatcher: Arc<Dispatcher<D, W>>,
}

impl<D: Datastore + 'static, W: Workload> Node<D, W> {
    /// Generates a node id, wires a dispatcher over `datastore` and starts
    /// serving. Auto-create is enabled.
    pub async fn new(datastore: Arc<D>, workload: W, config: &RlbConfig) -> anyhow::Result<Self> {
        Self::bind(datastore, None, workload, config, None, true).await
    }

    /// Full control over node id, per-bind pool override and the
    /// auto-create policy, for callers embedding more than one node or
    /// needing a deterministic id in tests.
    pub async fn bind(
        datastore: Arc<D>,
        node_id: Option<String>,
        workload: W,
        config: &RlbConfig,
        pool_id_override: Option<&str>,
        auto_create: bool,
    ) -> anyhow::Result<Self> {
        let node_id = node_id.unwrap_or_else(rlb_id::generate_node_id);
        let pool_id = config.resolve_pool_id(pool_id_override);

        let dispatcher = Dispatcher::new(
            datastore,
            pool_id,
            node_id.clone(),
            workload,
            config.dispatcher_config(auto_create),
        )
        .await
        .map_err(|err| anyhow::anyhow!("failed to wire dispatcher for node {node_id}: {err}"))?;

        Ok(Self {
            id: node_id,
            dispatcher,
        })
    }

    /// This node's opaque id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `true` while this node's datastore connection is up.
    pub fn is_online(&self) -> bool {
        self.dispatcher.is_online()
    }

    pub fn metrics(&self) -> Arc<rlb_dispatch::DispatchMetrics> {
        self.dispatcher.metrics()
    }

    /// Handles one external request: routes to the lowest-loaded node in
    /// the pool, or this node's own consumer.
    pub async fn consume(
        &self,
        request: DispatchRequest,
    ) -> Result<DispatchResponse, rlb_dispatch::Error> {
        self.dispatcher.consume(request).await
    }

    /// Closes this node: stops accepting work, tears down the RPC node and
    /// load registry, and waits for every active job to drain.
    pub async fn close(&self) {
        self.dispatcher.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rlb_datastore::MemoryDatastore;
    use rlb_scheduler::{JobHandle, JobInstance};
    use std::time::Duration;

    struct EchoWorkload;

    struct EndedJob;

    #[async_trait]
    impl JobInstance for EndedJob {
        async fn terminate(&self) {}
    }

    #[async_trait]
    impl Workload for EchoWorkload {
        fn default_seat_count(&self) -> u32 {
            4
        }
        async fn create(&self, _job: JobHandle) -> Arc<dyn JobInstance> {
            Arc::new(EndedJob)
        }
    }

    #[tokio::test]
    async fn new_generates_a_node_id_and_serves_locally() {
        let datastore = Arc::new(MemoryDatastore::new());
        let config = RlbConfig {
            report_interval: Duration::from_millis(50),
            ..RlbConfig::default()
        };
        let node = Node::new(datastore, EchoWorkload, &config).await.unwrap();

        assert_eq!(node.id().len(), rlb_id::NODE_ID_LEN);
        let response = node
            .consume(DispatchRequest::new(vec!["p1".into()]))
            .await
            .unwrap();
        assert!(!response.room_name.is_empty());

        node.close().await;
    }

    #[tokio::test]
    async fn bind_honors_an_explicit_id_and_pool_override() {
        let datastore = Arc::new(MemoryDatastore::new());
        let config = RlbConfig::default();
        let node = Node::bind(
            datastore,
            Some("fixed".to_owned()),
            EchoWorkload,
            &config,
            Some("pool-override"),
            true,
        )
        .await
        .unwrap();

        assert_eq!(node.id(), "fixed");
        node.close().await;
    }
}
