// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// RPC-layer error observed by a caller of [`crate::RpcNode::call`].
///
/// A call resolves to exactly one of a value, a timeout, no listening
/// peer, or a handler error; this enum is the latter three (the value
/// case is `Ok`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The publish reached zero subscribers: no such peer is listening.
    #[error("no peer listening on the request channel")]
    NoSuchPeer,
    /// No response arrived before the deadline.
    #[error("call timed out before a response arrived")]
    CallTimeout,
    /// The remote handler ran and returned an error.
    #[error("remote handler error: {0}")]
    HandlerError(String),
    /// The envelope could not be decoded.
    #[error("failed to decode RPC envelope: {0}")]
    Decode(String),
    /// A datastore operation (publish/subscribe) failed.
    ///
    /// Stringified rather than wrapped: `rlb_datastore::Error` carries a
    /// `redis::RedisError` that is none of `Clone`/`PartialEq`/`Eq`, and
    /// this enum needs all three (callers compare against `Error::NoSuchPeer`
    /// etc. and the dispatcher clones errors across its fallback path).
    #[error("datastore error: {0}")]
    Datastore(String),
}

impl From<rlb_datastore::Error> for Error {
    fn from(err: rlb_datastore::Error) -> Self {
        Error::Datastore(err.to_string())
    }
}
