// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Datastore collaborator error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("datastore is not connected")]
    NotConnected,
    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error("{0}")]
    Other(String),
}
