// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{ConnectionEvent, Datastore, Error, Subscription, SubscriptionMessage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::debug;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// An in-process [`Datastore`] used by every test and demo in this
/// workspace. Pub/sub fan-out is a `HashMap` of per-channel subscriber
/// lists; keys carry a lazily-checked expiry instead of a background
/// reaper, since the core only ever reads through `get`/`mget`/`keys`.
pub struct MemoryDatastore {
    kv: Mutex<HashMap<String, Entry>>,
    subscribers: Mutex<HashMap<String, Vec<flume::Sender<SubscriptionMessage>>>>,
    events: broadcast::Sender<ConnectionEvent>,
    connected: std::sync::atomic::AtomicBool,
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatastore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            kv: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            events,
            connected: std::sync::atomic::AtomicBool::new(true),
        }
    }

    /// Test/demo hook: simulates a connection drop, emitting
    /// [`ConnectionEvent::Disconnected`].
    pub fn simulate_disconnect(&self) {
        self.connected
            .store(false, std::sync::atomic::Ordering::SeqCst);
        let _ = self.events.send(ConnectionEvent::Disconnected);
        debug!("memory datastore: simulated disconnect");
    }

    /// Test/demo hook: simulates recovery, emitting
    /// [`ConnectionEvent::Reconnected`].
    pub fn simulate_reconnect(&self) {
        self.connected
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let _ = self.events.send(ConnectionEvent::Reconnected);
        debug!("memory datastore: simulated reconnect");
    }

    fn require_connected(&self) -> Result<(), Error> {
        if self.connected.load(std::sync::atomic::Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn is_live(entry: &Entry, now: Instant) -> bool {
        entry.expires_at > now
    }
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => candidate.starts_with(prefix),
        None => candidate == pattern,
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        self.require_connected()?;
        let mut kv = self.kv.lock().unwrap();
        kv.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        self.require_connected()?;
        let kv = self.kv.lock().unwrap();
        let now = Instant::now();
        Ok(kv
            .get(key)
            .filter(|e| Self::is_live(e, now))
            .map(|e| e.value.clone()))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, Error> {
        self.require_connected()?;
        let kv = self.kv.lock().unwrap();
        let now = Instant::now();
        Ok(keys
            .iter()
            .map(|k| {
                kv.get(k)
                    .filter(|e| Self::is_live(e, now))
                    .map(|e| e.value.clone())
            })
            .collect())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        self.require_connected()?;
        let kv = self.kv.lock().unwrap();
        let now = Instant::now();
        Ok(kv
            .iter()
            .filter(|(_, e)| Self::is_live(e, now))
            .map(|(k, _)| k.clone())
            .filter(|k| glob_match(pattern, k))
            .collect())
    }

    async fn del(&self, key: &str) -> Result<(), Error> {
        self.require_connected()?;
        self.kv.lock().unwrap().remove(key);
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<u32, Error> {
        self.require_connected()?;
        let mut subscribers = self.subscribers.lock().unwrap();
        let Some(senders) = subscribers.get_mut(channel) else {
            return Ok(0);
        };
        let payload = (channel.to_owned(), message.to_owned());
        senders.retain(|s| s.send(payload.clone()).is_ok());
        Ok(senders.len() as u32)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, Error> {
        self.require_connected()?;
        let (tx, rx) = flume::unbounded();
        self.subscribers
            .lock()
            .unwrap()
            .entry(channel.to_owned())
            .or_default()
            .push(tx);
        Ok(Subscription { receiver: rx })
    }

    fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }
}
