// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Pub/sub RPC transport carrying request/response pairs between anonymous
//! nodes identified only by opaque ids.
//!
//! Pending calls live in a correlation-id-keyed table of response
//! channels (`HashMap<String, flume::Sender<_>>`), the same shape a
//! request/response protocol over a message-oriented transport uses when
//! it has no persistent connection to hang a callback off of.

mod envelope;
mod error;
mod handler;
mod metrics;
mod node;
pub mod payload;

pub use envelope::{RpcRequest, RpcResponse};
pub use error::Error;
pub use handler::RpcHandler;
pub use metrics::RpcMetrics;
pub use node::RpcNode;
