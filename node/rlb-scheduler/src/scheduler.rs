// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::job::{JobEntry, ReservationSlot};
use crate::metrics::SchedulerMetrics;
use crate::workload::{JobHandle, JobInstance, JobOps, Workload};
use crate::Error;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex, Semaphore};
use tracing::{debug, error};

/// Tunables owned by the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Max concurrent job-creation operations.
    pub concurrency: usize,
    /// Reservation lifetime.
    pub reservation_hold_time: Duration,
    /// Idle-poll cadence for the auto-destroy capability. `Duration::ZERO`
    /// disables auto-destroy entirely.
    pub auto_destroy_check_interval: Duration,
    /// Whether a match request with no satisfying job may create one, or
    /// must fail with [`Error::NoMatch`].
    pub auto_create: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            reservation_hold_time: Duration::from_millis(10_000),
            auto_destroy_check_interval: Duration::from_millis(10_000),
            auto_create: true,
        }
    }
}

/// A request to match `player_ids` into a job, creating one if none
/// qualifies and creation is permitted.
pub struct MatchRequest {
    pub player_ids: Vec<String>,
    /// Seat count for a newly created job; falls back to the workload's
    /// default when absent.
    pub seat_count: Option<u32>,
    /// Opaque properties stored on a newly created job, evaluated by a
    /// later request's `criteria`.
    pub properties: serde_json::Value,
    /// Evaluated against an existing job's `properties`; `None` matches
    /// any open job with enough free seats.
    pub criteria: Option<Criteria>,
}

pub type Criteria = Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>;

impl MatchRequest {
    pub fn new(player_ids: Vec<String>) -> Self {
        Self {
            player_ids,
            seat_count: None,
            properties: serde_json::Value::Null,
            criteria: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResponse {
    pub room_name: String,
}

struct State {
    jobs: IndexMap<String, JobEntry>,
}

struct Shared<W: Workload> {
    workload: W,
    concurrency: Semaphore,
    reservation_hold: Duration,
    auto_destroy_interval: Duration,
    auto_create: bool,
    state: Mutex<State>,
    closed: AtomicBool,
    load_tx: watch::Sender<u32>,
    room_full_tx: broadcast::Sender<String>,
    metrics: Arc<SchedulerMetrics>,
    self_weak: Weak<Shared<W>>,
}

/// The consumer scheduler: owns the active job set and the
/// bounded-concurrency machinery that creates new ones.
pub struct ConsumerScheduler<W: Workload> {
    shared: Arc<Shared<W>>,
}

impl<W: Workload> Clone for ConsumerScheduler<W> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<W: Workload> ConsumerScheduler<W> {
    pub fn new(workload: W, config: SchedulerConfig) -> Self {
        let (load_tx, _) = watch::channel(0u32);
        let (room_full_tx, _) = broadcast::channel(32);
        let shared = Arc::new_cyclic(|weak: &Weak<Shared<W>>| Shared {
            workload,
            concurrency: Semaphore::new(config.concurrency.max(1)),
            reservation_hold: config.reservation_hold_time,
            auto_destroy_interval: config.auto_destroy_check_interval,
            auto_create: config.auto_create,
            state: Mutex::new(State {
                jobs: IndexMap::new(),
            }),
            closed: AtomicBool::new(false),
            load_tx,
            room_full_tx,
            metrics: Arc::new(SchedulerMetrics::default()),
            self_weak: weak.clone(),
        });
        Self { shared }
    }

    pub fn metrics(&self) -> Arc<SchedulerMetrics> {
        self.shared.metrics.clone()
    }

    /// Count of active jobs — the value reported to the load registry.
    pub async fn load(&self) -> u32 {
        self.shared.state.lock().await.jobs.len() as u32
    }

    /// Fires whenever the active-job count or aggregate seat occupancy
    /// changes, carrying the current [`ConsumerScheduler::load`] value.
    pub fn load_changes(&self) -> watch::Receiver<u32> {
        self.shared.load_tx.subscribe()
    }

    /// Fires once per job the first time it reaches capacity.
    pub fn room_full_events(&self) -> broadcast::Receiver<String> {
        self.shared.room_full_tx.subscribe()
    }

    /// Handles one match request.
    pub async fn consume(&self, request: MatchRequest) -> Result<MatchResponse, Error> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }

        if let Some(room_name) = self.shared.find_and_reserve(&request).await {
            self.shared.metrics.matched_total.inc();
            return Ok(MatchResponse { room_name });
        }

        if !self.shared.auto_create {
            return Err(Error::NoMatch);
        }

        self.shared.create_job(request).await
    }

    /// Refuses new work, terminates every active job and waits for all of
    /// them to drain.
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        let instances: Vec<Arc<dyn JobInstance>> = {
            let state = self.shared.state.lock().await;
            state.jobs.values().map(|job| job.instance.clone()).collect()
        };
        futures::future::join_all(instances.iter().map(|instance| instance.terminate())).await;
    }
}

impl<W: Workload> Shared<W> {
    /// Scans jobs in insertion order for the first one that can host the
    /// whole request, and reserves a seat per player if found.
    async fn find_and_reserve(self: &Arc<Self>, request: &MatchRequest) -> Option<String> {
        let needed = request.player_ids.len() as u32;
        let mut state = self.state.lock().await;

        let job_name = state
            .jobs
            .iter()
            .find(|(_, job)| {
                job.open
                    && job.available_seats() >= needed
                    && request
                        .criteria
                        .as_ref()
                        .map(|criteria| criteria(&job.properties))
                        .unwrap_or(true)
            })
            .map(|(name, _)| name.clone())?;

        let job = state.jobs.get_mut(&job_name).expect("just matched above");
        if job.available_seats() < needed {
            // Single-logical-execution-context scheduling means this
            // should be unreachable; if it ever trips, it is a seat
            // accounting invariant breach, surfaced to operators only.
            error!(job_name, "seat unavailable at reservation time");
            return None;
        }

        let now = Instant::now();
        for player_id in &request.player_ids {
            job.reservations.insert(
                player_id.clone(),
                ReservationSlot {
                    expires_at: now + self.reservation_hold,
                },
            );
        }
        let new_load = state.jobs.len() as u32;
        drop(state);

        self.metrics.active_jobs.set(new_load as i64);
        let _ = self.load_tx.send(new_load);
        for player_id in request.player_ids.iter().cloned() {
            self.arm_hold_timer(job_name.clone(), player_id);
        }

        Some(job_name)
    }

    async fn create_job(self: &Arc<Self>, request: MatchRequest) -> Result<MatchResponse, Error> {
        let seat_count = request
            .seat_count
            .unwrap_or_else(|| self.workload.default_seat_count());
        let (min, max) = (self.workload.min_seat_count(), self.workload.max_seat_count());
        if seat_count < min || seat_count > max || request.player_ids.len() as u32 > seat_count {
            return Err(Error::BadSeatCount);
        }

        let _permit = self
            .concurrency
            .acquire()
            .await
            .expect("semaphore is never closed");
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }

        let job_name = rlb_id::generate_id();
        let ops: Arc<dyn JobOps> = self.clone();
        let handle = JobHandle::new(job_name.clone(), ops);
        let instance = self.workload.create(handle).await;

        let now = Instant::now();
        let mut reservations = std::collections::HashMap::new();
        for player_id in &request.player_ids {
            reservations.insert(
                player_id.clone(),
                ReservationSlot {
                    expires_at: now + self.reservation_hold,
                },
            );
        }

        let entry = JobEntry {
            capacity: seat_count,
            occupants: HashSet::new(),
            reservations,
            open: true,
            properties: request.properties,
            instance,
            room_full_emitted: false,
        };

        let new_load = {
            let mut state = self.state.lock().await;
            state.jobs.insert(job_name.clone(), entry);
            state.jobs.len() as u32
        };
        self.metrics.jobs_created_total.inc();
        self.metrics.active_jobs.set(new_load as i64);
        let _ = self.load_tx.send(new_load);

        for player_id in request.player_ids.iter().cloned() {
            self.arm_hold_timer(job_name.clone(), player_id);
        }
        if self.auto_destroy_interval > Duration::ZERO {
            self.spawn_auto_destroy(job_name.clone());
        }

        Ok(MatchResponse { room_name: job_name })
    }

    fn arm_hold_timer(self: &Arc<Self>, job_name: String, player_id: String) {
        let shared = self.clone();
        let hold = self.reservation_hold;
        tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            shared.expire_reservation(&job_name, &player_id).await;
        });
    }

    async fn expire_reservation(self: &Arc<Self>, job_name: &str, player_id: &str) {
        let new_load = {
            let mut state = self.state.lock().await;
            let Some(job) = state.jobs.get_mut(job_name) else {
                return;
            };
            // Idempotent: already joined, or already expired once.
            if job.reservations.remove(player_id).is_none() {
                return;
            }
            state.jobs.len() as u32
        };
        self.metrics.reservations_expired_total.inc();
        self.metrics.active_jobs.set(new_load as i64);
        let _ = self.load_tx.send(new_load);
        debug!(job_name, player_id, "reservation expired");
    }

    fn spawn_auto_destroy(self: &Arc<Self>, job_name: String) {
        let shared = self.clone();
        let interval = self.auto_destroy_interval;
        tokio::spawn(async move {
            let mut idle_observations = 0u32;
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick is immediate; don't count it
            loop {
                ticker.tick().await;
                let still_idle = {
                    let state = shared.state.lock().await;
                    match state.jobs.get(&job_name) {
                        Some(job) => job.is_idle(),
                        None => return, // job already gone
                    }
                };
                if still_idle {
                    idle_observations += 1;
                    if idle_observations >= 2 {
                        shared.destroy_idle_job(&job_name).await;
                        return;
                    }
                } else {
                    idle_observations = 0;
                }
            }
        });
    }

    async fn destroy_idle_job(self: &Arc<Self>, job_name: &str) {
        let removed = {
            let mut state = self.state.lock().await;
            match state.jobs.get(job_name) {
                Some(job) if job.is_idle() => state.jobs.shift_remove(job_name),
                _ => None,
            }
        };
        let Some(job) = removed else { return };
        job.instance.terminate().await;
        let new_load = { self.state.lock().await.jobs.len() as u32 };
        self.metrics.jobs_auto_destroyed_total.inc();
        self.metrics.active_jobs.set(new_load as i64);
        let _ = self.load_tx.send(new_load);
        debug!(job_name, "auto-destroyed idle job");
    }

    async fn remove_job(self: &Arc<Self>, job_name: &str) {
        let new_load = {
            let mut state = self.state.lock().await;
            if state.jobs.shift_remove(job_name).is_none() {
                return;
            }
            state.jobs.len() as u32
        };
        self.metrics.active_jobs.set(new_load as i64);
        let _ = self.load_tx.send(new_load);
        debug!(job_name, "job ended, removed from active set");
    }
}

#[async_trait]
impl<W: Workload> JobOps for Shared<W> {
    fn signal_end(&self, job_name: &str) {
        let job_name = job_name.to_owned();
        let weak = self.self_weak.clone();
        tokio::spawn(async move {
            if let Some(shared) = weak.upgrade() {
                shared.remove_job(&job_name).await;
            }
        });
    }

    async fn mark_joined(&self, job_name: &str, player_id: &str) -> bool {
        let outcome = {
            let mut state = self.state.lock().await;
            let Some(job) = state.jobs.get_mut(job_name) else {
                return false;
            };
            if job.reservations.remove(player_id).is_none() {
                return false;
            }
            job.occupants.insert(player_id.to_owned());
            let should_emit_full = job.is_full() && !job.room_full_emitted;
            if should_emit_full {
                job.room_full_emitted = true;
            }
            (should_emit_full, state.jobs.len() as u32)
        };
        let (should_emit_full, new_load) = outcome;
        self.metrics.active_jobs.set(new_load as i64);
        let _ = self.load_tx.send(new_load);
        if should_emit_full {
            let _ = self.room_full_tx.send(job_name.to_owned());
        }
        true
    }

    async fn mark_left(&self, job_name: &str, player_id: &str) {
        let new_load = {
            let mut state = self.state.lock().await;
            let Some(job) = state.jobs.get_mut(job_name) else {
                return;
            };
            job.occupants.remove(player_id);
            state.jobs.len() as u32
        };
        self.metrics.active_jobs.set(new_load as i64);
        let _ = self.load_tx.send(new_load);
    }
}
