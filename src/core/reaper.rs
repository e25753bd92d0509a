// Copyright (c) 2026 Driftmesh
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! TTL reaper: sweeps expired bundles out of the live queues and purges the
//! expired queue past its retention window.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::core::engine::Engine;
use crate::core::store::{QueueStore, StoreError};
use crate::core::types::Queue;
use crate::monitoring::metrics::Metrics;

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Bundles moved into `expired`.
    pub moved_expired: u64,
    /// Expired bundles deleted past retention.
    pub purged: u64,
}

/// One reaper pass at `now`.
///
/// Cancellation-safe: every step is a single store transaction, and stopping
/// between steps leaves all invariants intact.
pub fn tick(
    store: &QueueStore,
    metrics: &Metrics,
    retention: Duration,
    now: DateTime<Utc>,
) -> Result<ReapReport, StoreError> {
    let mut report = ReapReport::default();

    for queue in Queue::REAPED {
        for id in store.expired_in(queue, now)? {
            match store.move_bundle(&id, queue, Queue::Expired) {
                Ok(()) => report.moved_expired += 1,
                // Raced with an explicit transition; nothing to do.
                Err(StoreError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
    }

    let cutoff = now - retention;
    for id in store.expired_in(Queue::Expired, cutoff)? {
        match store.delete_from(&id, Queue::Expired) {
            Ok(_) => report.purged += 1,
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e),
        }
    }

    metrics.reaper_expired_total.inc_by(report.moved_expired);
    metrics.reaper_purged_total.inc_by(report.purged);
    if report.moved_expired > 0 || report.purged > 0 {
        info!(
            moved = report.moved_expired,
            purged = report.purged,
            "reaper tick"
        );
    }
    Ok(report)
}

/// Spawn the periodic reaper on the current tokio runtime.
pub fn spawn(engine: Engine) -> tokio::task::JoinHandle<()> {
    let period = std::time::Duration::from_secs(engine.config().ttl_reaper_period_secs.max(1));
    let retention = Duration::seconds(engine.config().expired_retention_secs.max(1) as i64);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match tick(engine.store(), engine.metrics(), retention, Utc::now()) {
                Ok(_) => engine.refresh_cache_gauge(),
                Err(e) => warn!(?e, "reaper tick failed"),
            }
        }
    })
}
