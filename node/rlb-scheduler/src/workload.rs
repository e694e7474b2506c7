// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use async_trait::async_trait;
use std::sync::Arc;

/// The domain collaborator contract: the real-time game room, job runner,
/// or whatever concrete unit of work this fabric is load-balancing. The
/// core never names a concrete workload type; it only ever holds one
/// behind this trait.
#[async_trait]
pub trait Workload: Send + Sync + 'static {
    /// Seat count used when a match request does not specify one.
    fn default_seat_count(&self) -> u32;

    /// Lower bound on a requested seat count. Defaults to
    /// [`Workload::default_seat_count`] (a fixed-size workload).
    fn min_seat_count(&self) -> u32 {
        self.default_seat_count()
    }

    /// Upper bound on a requested seat count. Defaults to
    /// [`Workload::default_seat_count`].
    fn max_seat_count(&self) -> u32 {
        self.default_seat_count()
    }

    /// Builds the object backing a freshly created job. `job` lets the
    /// backing object report occupant arrivals/departures and its own
    /// completion back to the scheduler that owns it.
    async fn create(&self, job: JobHandle) -> Arc<dyn JobInstance>;
}

/// The per-job object a [`Workload`] constructs.
#[async_trait]
pub trait JobInstance: Send + Sync {
    /// Resolves once the job is drainable: either its own `END` has fired
    /// or every current occupant has left.
    async fn terminate(&self);
}

/// Scheduler-side operations a [`JobHandle`] can invoke, type-erased so the
/// handle does not need to carry the scheduler's `Workload` type parameter.
#[async_trait]
pub(crate) trait JobOps: Send + Sync {
    /// Fire-and-forget `END` signal: the job is finished.
    fn signal_end(&self, job_name: &str);

    /// Converts a reservation into an occupant. Returns `false` if there is
    /// no live reservation for `player_id` — a late arrival after expiry
    /// must not silently re-occupy a released seat.
    async fn mark_joined(&self, job_name: &str, player_id: &str) -> bool;

    /// Records that an occupant has left.
    async fn mark_left(&self, job_name: &str, player_id: &str);
}

/// A handle a [`JobInstance`] uses to report back to its owning scheduler.
pub struct JobHandle {
    name: String,
    ops: Arc<dyn JobOps>,
}

impl JobHandle {
    pub(crate) fn new(name: String, ops: Arc<dyn JobOps>) -> Self {
        Self { name, ops }
    }

    /// This job's scheduler-assigned name (the room name returned from
    /// `consume`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signals that this job is finished; the scheduler removes it from
    /// the active set and emits a load-change notification.
    pub fn end(&self) {
        self.ops.signal_end(&self.name);
    }

    /// Reports that `player_id` has actually joined the job, converting
    /// their reservation into an occupant. Returns `false` if their
    /// reservation already expired.
    pub async fn mark_joined(&self, player_id: &str) -> bool {
        self.ops.mark_joined(&self.name, player_id).await
    }

    /// Reports that an occupant has left the job.
    pub async fn mark_left(&self, player_id: &str) {
        self.ops.mark_left(&self.name, player_id).await;
    }
}
