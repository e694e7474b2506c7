// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::time::Duration;

/// Caller-supplied configuration.
///
/// The core never reads an environment variable or a CLI flag itself: a
/// [`Node`](crate::Node) is always constructed from one fully-resolved
/// `RlbConfig`, built by whatever configuration loader the embedding
/// binary uses.
#[derive(Debug, Clone)]
pub struct RlbConfig {
    /// Isolates load keys and channels between logical pools sharing one
    /// datastore.
    pub pool_id: String,
    /// Load-report period and load-key TTL.
    pub report_interval: Duration,
    /// Max concurrent job-creation operations.
    pub concurrency: usize,
    /// Reservation lifetime.
    pub reservation_hold_time: Duration,
    /// Per-call RPC deadline.
    pub rpc_timeout: Duration,
    /// Idle-poll cadence for the auto-destroy capability.
    pub auto_destroy_check_interval: Duration,
}

impl Default for RlbConfig {
    fn default() -> Self {
        Self {
            pool_id: "global".to_owned(),
            report_interval: Duration::from_millis(30_000),
            concurrency: 1,
            reservation_hold_time: Duration::from_millis(10_000),
            rpc_timeout: Duration::from_millis(15_000),
            auto_destroy_check_interval: Duration::from_millis(10_000),
        }
    }
}

impl RlbConfig {
    /// Resolves a per-node `pool_id` override against this factory-level
    /// config: the override wins when given, otherwise the factory
    /// default applies.
    ///
    /// Guards against a spread-assignment mistake seen in similar pool
    /// configs elsewhere — overwriting a caller's per-bind override with
    /// the factory default instead of the other way around. The override
    /// must win when given.
    pub fn resolve_pool_id(&self, bind_override: Option<&str>) -> String {
        bind_override
            .map(str::to_owned)
            .unwrap_or_else(|| self.pool_id.clone())
    }

    pub(crate) fn scheduler_config(&self, auto_create: bool) -> rlb_scheduler::SchedulerConfig {
        rlb_scheduler::SchedulerConfig {
            concurrency: self.concurrency,
            reservation_hold_time: self.reservation_hold_time,
            auto_destroy_check_interval: self.auto_destroy_check_interval,
            auto_create,
        }
    }

    pub(crate) fn dispatcher_config(&self, auto_create: bool) -> rlb_dispatch::DispatcherConfig {
        rlb_dispatch::DispatcherConfig {
            report_interval: self.report_interval,
            rpc_timeout: self.rpc_timeout,
            scheduler: self.scheduler_config(auto_create),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_override_wins_over_the_factory_default() {
        let config = RlbConfig {
            pool_id: "factory-default".to_owned(),
            ..RlbConfig::default()
        };
        assert_eq!(config.resolve_pool_id(Some("per-bind")), "per-bind");
        assert_eq!(config.resolve_pool_id(None), "factory-default");
    }
}
