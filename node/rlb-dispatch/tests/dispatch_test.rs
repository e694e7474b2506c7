// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use async_trait::async_trait;
use rlb_datastore::MemoryDatastore;
use rlb_dispatch::{Dispatcher, DispatcherConfig, DispatchRequest, Error};
use rlb_scheduler::{JobHandle, JobInstance, SchedulerConfig, Workload};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// A workload whose jobs never end on their own and that counts how many
/// times it was asked to create one, so tests can tell whether a request
/// landed on this node or a peer.
struct CountingWorkload {
    seats: u32,
    created: Arc<AtomicUsize>,
}

struct NeverEndingJob {
    _ended: Arc<Notify>,
}

#[async_trait]
impl JobInstance for NeverEndingJob {
    async fn terminate(&self) {
        self._ended.notified().await;
    }
}

#[async_trait]
impl Workload for CountingWorkload {
    fn default_seat_count(&self) -> u32 {
        self.seats
    }
    async fn create(&self, _job: JobHandle) -> Arc<dyn JobInstance> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Arc::new(NeverEndingJob {
            _ended: Arc::new(Notify::new()),
        })
    }
}

fn workload(seats: u32) -> (CountingWorkload, Arc<AtomicUsize>) {
    let created = Arc::new(AtomicUsize::new(0));
    (
        CountingWorkload {
            seats,
            created: created.clone(),
        },
        created,
    )
}

fn fast_config() -> DispatcherConfig {
    DispatcherConfig {
        report_interval: Duration::from_millis(50),
        rpc_timeout: Duration::from_millis(200),
        scheduler: SchedulerConfig {
            auto_destroy_check_interval: Duration::ZERO,
            ..SchedulerConfig::default()
        },
    }
}

/// S1 — Local fast path: a single-node pool with load 0 handles the
/// request itself and reports its new load to the datastore.
#[tokio::test]
async fn single_node_pool_handles_locally_and_reports_load() {
    let ds = Arc::new(MemoryDatastore::new());
    let (load, created) = workload(4);
    let dispatcher = Dispatcher::new(ds.clone(), "pool", "AAAAA", load, fast_config())
        .await
        .unwrap();

    let response = dispatcher
        .consume(DispatchRequest::new(vec!["p1".into()]))
        .await
        .unwrap();
    assert!(!response.room_name.is_empty());
    assert_eq!(created.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    let key = rlb_datastore::keys::load_key("pool", "AAAAA");
    assert_eq!(ds.get(&key).await.unwrap(), Some("1".to_owned()));
}

/// S2 — Route to peer: node A (busy) routes to node B (idle); the request
/// never reaches A's own consumer.
#[tokio::test]
async fn routes_to_the_less_loaded_peer() {
    tokio::time::pause();
    let ds = Arc::new(MemoryDatastore::new());

    let (load_a, created_a) = workload(1);
    let dispatcher_a = Dispatcher::new(ds.clone(), "pool", "AAAAA", load_a, fast_config())
        .await
        .unwrap();
    // Saturate A with one job so its reported load is 1. This is also A's
    // registry's first-ever peer-load read, so it is not subject to the
    // read throttle.
    dispatcher_a
        .consume(DispatchRequest::new(vec!["seed".into()]))
        .await
        .unwrap();
    assert_eq!(created_a.load(Ordering::SeqCst), 1);

    let (load_b, created_b) = workload(4);
    let _dispatcher_b = Dispatcher::new(ds.clone(), "pool", "BBBBB", load_b, fast_config())
        .await
        .unwrap();

    // Let both nodes' periodic reporters land their loads, and clear A's
    // read-throttle window from the seed call above.
    tokio::time::advance(Duration::from_millis(1100)).await;
    tokio::task::yield_now().await;

    let response = dispatcher_a
        .consume(DispatchRequest::new(vec!["p1".into()]))
        .await
        .unwrap();
    assert!(!response.room_name.is_empty());
    // Still exactly one job on A (the seed); the new request landed on B.
    assert_eq!(created_a.load(Ordering::SeqCst), 1);
    assert_eq!(created_b.load(Ordering::SeqCst), 1);
}

/// S3 — Peer vanished: A believes B exists from a stale load entry, but B
/// is not actually subscribed; the publish delivers to zero subscribers
/// and the dispatcher falls back to its own consumer instead of erroring.
#[tokio::test]
async fn falls_back_to_local_when_the_chosen_peer_is_gone() {
    let ds = Arc::new(MemoryDatastore::new());
    let (load_a, created_a) = workload(4);
    let dispatcher_a = Dispatcher::new(ds.clone(), "pool", "AAAAA", load_a, fast_config())
        .await
        .unwrap();

    // A stale load entry for a peer that never subscribed to its channel.
    ds.set(
        &rlb_datastore::keys::load_key("pool", "BBBBB"),
        "0",
        Duration::from_secs(30),
    )
    .await
    .unwrap();

    let response = dispatcher_a
        .consume(DispatchRequest::new(vec!["p1".into()]))
        .await
        .unwrap();
    assert!(!response.room_name.is_empty());
    assert_eq!(created_a.load(Ordering::SeqCst), 1, "request must fall back to A");
    assert_eq!(
        dispatcher_a.metrics().fallback_total.get(),
        1,
        "the fallback path should be observable in metrics"
    );
}

/// Ties go local: equal loads never trigger RPC.
#[tokio::test]
async fn equal_load_prefers_self_and_issues_no_rpc() {
    let ds = Arc::new(MemoryDatastore::new());
    let (load_a, created_a) = workload(4);
    let dispatcher_a = Dispatcher::new(ds.clone(), "pool", "AAAAA", load_a, fast_config())
        .await
        .unwrap();

    ds.set(
        &rlb_datastore::keys::load_key("pool", "BBBBB"),
        "0",
        Duration::from_secs(30),
    )
    .await
    .unwrap();

    // A's own load is also 0 (nothing created yet), tying with B's
    // advertised load; local must win without attempting the peer at all.
    dispatcher_a
        .consume(DispatchRequest::new(vec!["p1".into()]))
        .await
        .unwrap();
    assert_eq!(created_a.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher_a.metrics().remote_total.get(), 0);
    assert_eq!(dispatcher_a.metrics().fallback_total.get(), 0);
}

/// S5 — Graceful close: once closed, new requests fail with `Closed` and
/// `close()` waits for active jobs to terminate before returning.
#[tokio::test]
async fn close_refuses_new_work_and_drains_active_jobs() {
    let ds = Arc::new(MemoryDatastore::new());
    let (load, _created) = workload(4);
    let dispatcher = Dispatcher::new(ds.clone(), "pool", "AAAAA", load, fast_config())
        .await
        .unwrap();

    dispatcher
        .consume(DispatchRequest::new(vec!["p1".into()]))
        .await
        .unwrap();

    // `NeverEndingJob::terminate` blocks on a notify nobody sends, so
    // `close()` must stay pending rather than returning immediately.
    let closing = dispatcher.clone();
    let closer = tokio::spawn(async move { closing.close().await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!closer.is_finished(), "close should wait for the job to drain");

    let err = dispatcher
        .consume(DispatchRequest::new(vec!["p2".into()]))
        .await
        .unwrap_err();
    assert_eq!(err, Error::Closed);
    closer.abort();

    let key = rlb_datastore::keys::load_key("pool", "AAAAA");
    assert_eq!(ds.get(&key).await.unwrap(), None, "load key must be deleted on close");
}

/// S6 — Offline degradation: once the datastore drops, every `consume`
/// runs locally without attempting to fetch peer loads or route via RPC.
#[tokio::test]
async fn offline_degrades_to_local_only() {
    let ds = Arc::new(MemoryDatastore::new());
    let (load, created) = workload(4);
    let dispatcher = Dispatcher::new(ds.clone(), "pool", "AAAAA", load, fast_config())
        .await
        .unwrap();

    ds.simulate_disconnect();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!dispatcher.is_online());

    let response = dispatcher
        .consume(DispatchRequest::new(vec!["p1".into()]))
        .await
        .unwrap();
    assert!(!response.room_name.is_empty());
    assert_eq!(created.load(Ordering::SeqCst), 1);
}
