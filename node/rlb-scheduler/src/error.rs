// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Scheduler error surfaced to the caller of
/// [`crate::ConsumerScheduler::consume`].
///
/// `SeatUnavailable` is deliberately not a variant here: it is an
/// internal-invariant breach surfaced to operators, not end callers, so
/// this crate only ever logs it (`tracing::error!`) if the defensive check
/// in `find_and_reserve` is ever actually tripped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("scheduler is closed")]
    Closed,
    #[error("no job matched and creation was not permitted")]
    NoMatch,
    #[error("requested seat count violates the workload's bounds")]
    BadSeatCount,
}
