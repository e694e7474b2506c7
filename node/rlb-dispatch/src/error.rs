// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Dispatcher error surfaced to the external caller of
/// [`crate::Dispatcher::consume`].
///
/// RPC failures (`rlb_rpc::Error`) never appear here: the dispatcher
/// swallows them into an unconditional local fallback. Scheduler errors
/// (`NoMatch`, `BadSeatCount`) pass through unchanged, since those are
/// match/seat errors that must reach the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("dispatcher is closed")]
    Closed,
    #[error(transparent)]
    Scheduler(#[from] rlb_scheduler::Error),
}
