// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Gossiped load registry: a per-node periodic reporter and reader of peer
//! loads via TTL'd keys in the shared [`rlb_datastore::Datastore`].
//!
//! Peer loads live behind a `tokio::sync::Mutex`-guarded map rather than a
//! read/write lock, because every access here — including the throttled
//! read itself — is a compound read-modify sequence, not a pure read.

mod error;

pub use error::Error;

use rlb_datastore::{keys, ConnectionEvent, Datastore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tracing::{debug, warn};

/// Write throttle: at most one real datastore write per second, trailing
/// edge.
const WRITE_THROTTLE: Duration = Duration::from_secs(1);
/// Read throttle: at most one real datastore scan per second, cached in
/// between.
const READ_THROTTLE: Duration = Duration::from_secs(1);

/// An online/offline transition of the registry's connection to the
/// datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    Online,
    Offline,
}

struct State {
    last_write: Option<Instant>,
    write_scheduled: bool,
    peer_loads: HashMap<String, u32>,
    last_read: Option<Instant>,
}

struct Inner<D: Datastore + 'static> {
    datastore: Arc<D>,
    pool_id: String,
    node_id: String,
    report_interval: Duration,
    load_tx: watch::Sender<u32>,
    state: Mutex<State>,
    online: AtomicBool,
    events_tx: broadcast::Sender<RegistryEvent>,
    shutdown: Notify,
}

/// A node's view into the gossiped load registry: writes its own load,
/// reads everyone else's.
pub struct LoadRegistry<D: Datastore + 'static> {
    inner: Arc<Inner<D>>,
}

impl<D: Datastore + 'static> Clone for LoadRegistry<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: Datastore + 'static> LoadRegistry<D> {
    /// Starts the registry: spawns the periodic unconditional reporter and
    /// the connection-state listener. `report_interval` is both the report
    /// period and the TTL on the written key.
    pub fn new(
        datastore: Arc<D>,
        pool_id: impl Into<String>,
        node_id: impl Into<String>,
        report_interval: Duration,
    ) -> Self {
        let (load_tx, _) = watch::channel(0u32);
        let (events_tx, _) = broadcast::channel(32);
        let inner = Arc::new(Inner {
            datastore,
            pool_id: pool_id.into(),
            node_id: node_id.into(),
            report_interval,
            load_tx,
            state: Mutex::new(State {
                last_write: None,
                write_scheduled: false,
                peer_loads: HashMap::new(),
                last_read: None,
            }),
            online: AtomicBool::new(true),
            events_tx,
            shutdown: Notify::new(),
        });

        // Subscribed here, before the listener task is even scheduled, so
        // no disconnect/reconnect signal raised immediately after
        // construction can be missed.
        let connection_events = inner.datastore.events();

        tokio::spawn(periodic_reporter(inner.clone()));
        tokio::spawn(connection_listener(inner.clone(), connection_events));

        Self { inner }
    }

    /// Reports the consumer's current load. Called on every load-change
    /// signal; coalesced with the periodic report under one throttle.
    pub async fn report(&self, load: u32) -> Result<(), Error> {
        let _ = self.inner.load_tx.send(load);
        self.inner.maybe_write(load).await
    }

    /// Lists every peer's load, throttled to one real read per second; a
    /// call within the window returns the last cached map.
    pub async fn fetch_loads(&self) -> Result<HashMap<String, u32>, Error> {
        let mut state = self.inner.state.lock().await;
        if let Some(last_read) = state.last_read {
            if last_read.elapsed() < READ_THROTTLE {
                return Ok(state.peer_loads.clone());
            }
        }

        let pattern = keys::load_key_pattern(&self.inner.pool_id);
        let found = self.inner.datastore.keys(&pattern).await?;
        let values = self.inner.datastore.mget(&found).await?;

        let mut loads = HashMap::with_capacity(found.len());
        for (key, value) in found.iter().zip(values) {
            let (Some(peer_id), Some(raw)) = (
                keys::node_id_from_load_key(&self.inner.pool_id, key),
                value,
            ) else {
                continue;
            };
            match raw.parse::<u32>() {
                Ok(load) => {
                    loads.insert(peer_id.to_owned(), load);
                }
                Err(err) => warn!(%err, key, "peer load key held a non-integer value"),
            }
        }

        state.peer_loads = loads.clone();
        state.last_read = Some(Instant::now());
        Ok(loads)
    }

    /// `true` while the datastore connection is up.
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Subscribes to online/offline transitions.
    pub fn events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Deletes this node's load key and stops the background tasks.
    pub async fn close(&self) -> Result<(), Error> {
        self.inner.shutdown.notify_waiters();
        let key = keys::load_key(&self.inner.pool_id, &self.inner.node_id);
        self.inner.datastore.del(&key).await?;
        Ok(())
    }
}

impl<D: Datastore + 'static> Inner<D> {
    async fn maybe_write(self: &Arc<Self>, load: u32) -> Result<(), Error> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        let due = match state.last_write {
            Some(last) => now.duration_since(last) >= WRITE_THROTTLE,
            None => true,
        };

        if due {
            state.last_write = Some(now);
            drop(state);
            return self.write_now(load).await;
        }

        if !state.write_scheduled {
            state.write_scheduled = true;
            let delay = WRITE_THROTTLE - now.duration_since(state.last_write.unwrap());
            let this = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let load = *this.load_tx.borrow();
                {
                    let mut state = this.state.lock().await;
                    state.write_scheduled = false;
                    state.last_write = Some(Instant::now());
                }
                if let Err(err) = this.write_now(load).await {
                    warn!(%err, "trailing-edge load report failed");
                }
            });
        }
        Ok(())
    }

    async fn write_now(&self, load: u32) -> Result<(), Error> {
        let key = keys::load_key(&self.pool_id, &self.node_id);
        self.datastore
            .set(&key, &load.to_string(), self.report_interval)
            .await?;
        debug!(node_id = %self.node_id, load, "reported load");
        Ok(())
    }

    /// Forces an immediate write, bypassing the throttle. Used on
    /// reconnect so a fresh report lands within one throttle window.
    async fn force_write(&self) {
        let load = *self.load_tx.borrow();
        {
            let mut state = self.state.lock().await;
            state.last_write = Some(Instant::now());
        }
        if let Err(err) = self.write_now(load).await {
            warn!(%err, "forced load report on reconnect failed");
        }
    }
}

async fn periodic_reporter<D: Datastore + 'static>(inner: Arc<Inner<D>>) {
    let mut ticker = tokio::time::interval(inner.report_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = inner.shutdown.notified() => return,
            _ = ticker.tick() => {
                let load = *inner.load_tx.borrow();
                {
                    let mut state = inner.state.lock().await;
                    state.last_write = Some(Instant::now());
                }
                if let Err(err) = inner.write_now(load).await {
                    warn!(%err, "periodic load report failed");
                }
            }
        }
    }
}

async fn connection_listener<D: Datastore + 'static>(
    inner: Arc<Inner<D>>,
    mut events: broadcast::Receiver<ConnectionEvent>,
) {
    loop {
        tokio::select! {
            _ = inner.shutdown.notified() => return,
            event = events.recv() => {
                let event = match event {
                    Ok(e) => e,
                    Err(_) => return,
                };
                match event {
                    ConnectionEvent::Disconnected => {
                        inner.online.store(false, Ordering::SeqCst);
                        let _ = inner.events_tx.send(RegistryEvent::Offline);
                        debug!(node_id = %inner.node_id, "load registry offline");
                    }
                    ConnectionEvent::Connected | ConnectionEvent::Reconnected => {
                        inner.online.store(true, Ordering::SeqCst);
                        let _ = inner.events_tx.send(RegistryEvent::Online);
                        debug!(node_id = %inner.node_id, "load registry online");
                        inner.force_write().await;
                    }
                }
            }
        }
    }
}
