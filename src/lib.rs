// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Core of a distributed load-balanced request dispatch fabric:
//! a gossiped load registry, a least-loaded-peer dispatcher, a pub/sub RPC
//! transport and a bounded-concurrency consumer scheduler, over a shared
//! datastore that provides publish/subscribe and TTL'd key/value storage.
//!
//! Every component has its own crate (`rlb-id`, `rlb-datastore`, `rlb-rpc`,
//! `rlb-registry`, `rlb-scheduler`, `rlb-dispatch`); this crate only wires
//! them together behind [`Node`] and re-exports the surface a downstream
//! binary needs to plug in a concrete [`Workload`] and datastore.
//!
//! The domain workload (a real-time game room, a job runner, or anything
//! else this fabric load-balances), construction of the datastore client
//! and its authentication, and any CLI/configuration-loading/packaging
//! layer are deliberately out of scope — they are named external
//! collaborators the caller supplies.

mod config;
mod node;

pub use config::RlbConfig;
pub use node::Node;

pub use rlb_datastore::{ConnectionEvent, Datastore, MemoryDatastore, Subscription};
#[cfg(feature = "redis")]
pub use rlb_datastore::RedisDatastore;
pub use rlb_dispatch::{DispatchMetrics, DispatchRequest, DispatchResponse, Error};
pub use rlb_registry::RegistryEvent;
pub use rlb_rpc::RpcHandler;
pub use rlb_scheduler::{JobHandle, JobInstance, Workload};
