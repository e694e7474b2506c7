// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The dispatcher: the front door a local caller talks to.
//!
//! Wires a [`rlb_scheduler::ConsumerScheduler`], a [`rlb_registry::LoadRegistry`]
//! and an [`rlb_rpc::RpcNode`] together over one shared
//! [`rlb_datastore::Datastore`]: it chooses the lowest-loaded node for each
//! request, preferring itself on a tie, and falls back to its own consumer
//! unconditionally whenever a remote route fails.

mod dispatch;
mod error;
mod metrics;
mod request;

pub use dispatch::{Dispatcher, DispatcherConfig};
pub use error::Error;
pub use metrics::DispatchMetrics;
pub use request::{DispatchRequest, DispatchResponse};
