// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The shared pub/sub key-value datastore collaborator.
//!
//! The dispatch fabric never constructs or authenticates a transport client
//! itself — that remains the caller's job — but it does need a stable
//! contract to program against. [`Datastore`] is that contract: TTL'd
//! key/value storage plus a publish/subscribe transport that reports how
//! many subscribers a publish reached.
//!
//! [`MemoryDatastore`] is a complete, dependency-free implementation used by
//! every test in this workspace. A [`redis`]-backed implementation is
//! available behind the `redis` feature for production use.

mod error;
mod memory;
#[cfg(feature = "redis")]
mod redis_backend;

pub use error::Error;
pub use memory::MemoryDatastore;
#[cfg(feature = "redis")]
pub use redis_backend::RedisDatastore;

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;

/// A connection-state signal emitted by a [`Datastore`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Reconnected,
}

/// One message delivered to a subscription: `(channel, payload)`.
pub type SubscriptionMessage = (String, String);

/// A live channel subscription. Dropping it does not unsubscribe — callers
/// that need to stop receiving must stop polling; the underlying channel is
/// torn down when the datastore itself disconnects or is dropped. This
/// mirrors the fire-and-forget nature of the transport: no durable queue
/// semantics.
pub struct Subscription {
    pub(crate) receiver: flume::Receiver<SubscriptionMessage>,
}

impl Subscription {
    /// Waits for the next message on this subscription.
    pub async fn recv(&self) -> Option<SubscriptionMessage> {
        self.receiver.recv_async().await.ok()
    }
}

/// The datastore collaborator contract.
///
/// `set`/`get`/`mget`/`keys`/`del` implement the load-registry key/value
/// half; `publish`/`subscribe` implement the RPC transport half. Every
/// method may suspend (it is a network call in the `redis` backend) and the
/// core treats suspension points as the only places state may interleave.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Sets `key` to `value` with a time-to-live after which it expires.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error>;

    /// Reads a single key, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Reads several keys at once, preserving order and presence per key.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, Error>;

    /// Lists keys matching a glob `pattern` (a trailing `*` is the only
    /// wildcard the core ever issues, since it only ever scans
    /// `{prefix}:*`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error>;

    /// Deletes a key; deleting an absent key is not an error.
    async fn del(&self, key: &str) -> Result<(), Error>;

    /// Publishes `message` to `channel`, returning the number of
    /// subscribers it was delivered to. A return of `0` means nobody is
    /// listening right now.
    async fn publish(&self, channel: &str, message: &str) -> Result<u32, Error>;

    /// Subscribes to a channel on a connection dedicated to subscriptions.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, Error>;

    /// A stream of connection-state transitions (connect/error/reconnect).
    fn events(&self) -> broadcast::Receiver<ConnectionEvent>;
}

/// Key/channel layout, qualified by an optional pool id so several logical
/// pools can share one datastore.
pub mod keys {
    /// `RDB:{poolId}:{nodeId}` — load key, value is a decimal integer, TTL
    /// equals the reporter's `reportInterval`.
    pub fn load_key(pool_id: &str, node_id: &str) -> String {
        format!("RDB:{pool_id}:{node_id}")
    }

    /// `RDB:{poolId}:*` — pattern used to scan every peer's load key.
    pub fn load_key_pattern(pool_id: &str) -> String {
        format!("RDB:{pool_id}:*")
    }

    /// `RPC:{poolId}:{nodeId}` — request channel.
    pub fn rpc_request_channel(pool_id: &str, node_id: &str) -> String {
        format!("RPC:{pool_id}:{node_id}")
    }

    /// `RPC:{poolId}:{nodeId}:result` — response channel.
    pub fn rpc_result_channel(pool_id: &str, node_id: &str) -> String {
        format!("RPC:{pool_id}:{node_id}:result")
    }

    /// Extracts the node id suffix from a load key produced by [`load_key`].
    pub fn node_id_from_load_key<'a>(pool_id: &str, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(&format!("RDB:{pool_id}:"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_has_the_expected_shape() {
        assert_eq!(keys::load_key("global", "abcde"), "RDB:global:abcde");
        assert_eq!(keys::load_key_pattern("global"), "RDB:global:*");
        assert_eq!(
            keys::rpc_request_channel("global", "abcde"),
            "RPC:global:abcde"
        );
        assert_eq!(
            keys::rpc_result_channel("global", "abcde"),
            "RPC:global:abcde:result"
        );
        assert_eq!(
            keys::node_id_from_load_key("global", "RDB:global:abcde"),
            Some("abcde")
        );
    }
}
