// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Production [`Datastore`] backed by Redis. Construction and
//! authentication of the underlying client are a caller concern; this
//! module only implements the contract once a client exists.

use crate::{ConnectionEvent, Datastore, Error, Subscription, SubscriptionMessage};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// A Redis-backed [`Datastore`].
///
/// Commands run over a shared [`ConnectionManager`] (it reconnects and
/// multiplexes transparently); every [`subscribe`](Datastore::subscribe)
/// call opens its own dedicated pub/sub connection off the same client,
/// honoring the invariant that a subscribed connection cannot carry other
/// commands.
pub struct RedisDatastore {
    client: redis::Client,
    conn: ConnectionManager,
    events: broadcast::Sender<ConnectionEvent>,
}

impl RedisDatastore {
    /// Wraps an already-authenticated [`redis::Client`].
    pub async fn new(client: redis::Client) -> Result<Self, Error> {
        let conn = ConnectionManager::new(client.clone()).await?;
        let (events, _) = broadcast::channel(32);
        let _ = events.send(ConnectionEvent::Connected);
        Ok(Self {
            client,
            conn,
            events,
        })
    }
}

#[async_trait]
impl Datastore for RedisDatastore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let ttl_secs = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, Error> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        Ok(conn.mget(keys).await?)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        let mut conn = self.conn.clone();
        Ok(conn.keys(pattern).await?)
    }

    async fn del(&self, key: &str) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<u32, Error> {
        let mut conn = self.conn.clone();
        Ok(conn.publish(channel, message).await?)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, Error> {
        let client = self.client.clone();
        let channel = channel.to_owned();
        let (tx, rx) = flume::unbounded::<SubscriptionMessage>();
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut pubsub = match client.get_async_pubsub().await {
                Ok(p) => p,
                Err(err) => {
                    warn!(%err, "failed to open dedicated pub/sub connection");
                    let _ = events.send(ConnectionEvent::Disconnected);
                    return;
                }
            };
            if let Err(err) = pubsub.subscribe(&channel).await {
                warn!(%err, channel, "failed to subscribe to channel");
                return;
            }
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(err) => {
                        warn!(%err, "failed to decode pub/sub payload");
                        continue;
                    }
                };
                if tx.send((channel.clone(), payload)).is_err() {
                    debug!(channel, "subscriber dropped, closing pub/sub task");
                    break;
                }
            }
        });

        Ok(Subscription { receiver: rx })
    }

    fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }
}
