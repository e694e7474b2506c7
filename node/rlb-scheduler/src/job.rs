// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::workload::JobInstance;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// A reserved, not-yet-occupied seat.
pub(crate) struct ReservationSlot {
    pub expires_at: Instant,
}

/// Scheduler-side bookkeeping for one active job. The domain object itself
/// lives behind `instance`; everything else here is seat accounting the
/// scheduler owns directly.
pub(crate) struct JobEntry {
    pub capacity: u32,
    pub occupants: HashSet<String>,
    pub reservations: HashMap<String, ReservationSlot>,
    pub open: bool,
    pub properties: serde_json::Value,
    pub instance: Arc<dyn JobInstance>,
    pub room_full_emitted: bool,
}

impl JobEntry {
    /// Invariant: `|occupants| + |reservations| <= capacity`.
    pub fn available_seats(&self) -> u32 {
        let held = (self.occupants.len() + self.reservations.len()) as u32;
        self.capacity.saturating_sub(held)
    }

    pub fn is_full(&self) -> bool {
        self.available_seats() == 0
    }

    /// Two consecutive `true` observations license auto-destroy.
    pub fn is_idle(&self) -> bool {
        self.occupants.is_empty() && self.reservations.is_empty()
    }
}
