// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    /// Active job count, the same value `load()` reports.
    pub active_jobs: Gauge,
    /// Match requests satisfied by an existing job.
    pub matched_total: Counter,
    /// Jobs created because no existing job matched.
    pub jobs_created_total: Counter,
    /// Reservations that expired without the player joining.
    pub reservations_expired_total: Counter,
    /// Jobs torn down by the idle auto-destroy capability.
    pub jobs_auto_destroyed_total: Counter,
}

impl SchedulerMetrics {
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "scheduler_active_jobs",
            "Count of active jobs owned by this node's scheduler",
            metrics.active_jobs.clone(),
        );
        registry.register(
            "scheduler_matched_total",
            "Match requests satisfied by an existing job",
            metrics.matched_total.clone(),
        );
        registry.register(
            "scheduler_jobs_created_total",
            "Jobs created because no existing job matched",
            metrics.jobs_created_total.clone(),
        );
        registry.register(
            "scheduler_reservations_expired_total",
            "Reservations that expired without the player joining",
            metrics.reservations_expired_total.clone(),
        );
        registry.register(
            "scheduler_jobs_auto_destroyed_total",
            "Jobs torn down by the idle auto-destroy capability",
            metrics.jobs_auto_destroyed_total.clone(),
        );
        metrics
    }
}
