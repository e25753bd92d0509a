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

//! Engine metrics.

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Bundles created locally.
    pub bundles_created_total: IntCounter,
    /// Inbound bundles stored into inbox.
    pub intake_stored_total: IntCounter,
    /// Inbound bundles quarantined.
    pub intake_quarantined_total: IntCounter,
    /// Inbound bundles dropped (expired/duplicate/over-budget).
    pub intake_dropped_total: IntCounter,
    /// Bundles moved to expired by the reaper.
    pub reaper_expired_total: IntCounter,
    /// Expired bundles purged past retention.
    pub reaper_purged_total: IntCounter,
    /// Bundles deleted by eviction.
    pub eviction_bundles_total: IntCounter,
    /// Bytes freed by eviction.
    pub eviction_bytes_total: IntCounter,
    /// Envelopes served to peers (request/pull).
    pub sync_served_total: IntCounter,
    /// Envelopes withheld from peers by policy.
    pub sync_denied_total: IntCounter,
    /// Current stored bytes.
    pub cache_used_bytes: IntGauge,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let bundles_created_total =
            IntCounter::new("driftmesh_bundles_created_total", "Bundles created locally")
                .map_err(|_| MetricsError::Prom)?;
        let intake_stored_total =
            IntCounter::new("driftmesh_intake_stored_total", "Inbound bundles stored")
                .map_err(|_| MetricsError::Prom)?;
        let intake_quarantined_total = IntCounter::new(
            "driftmesh_intake_quarantined_total",
            "Inbound bundles quarantined",
        )
        .map_err(|_| MetricsError::Prom)?;
        let intake_dropped_total =
            IntCounter::new("driftmesh_intake_dropped_total", "Inbound bundles dropped")
                .map_err(|_| MetricsError::Prom)?;
        let reaper_expired_total = IntCounter::new(
            "driftmesh_reaper_expired_total",
            "Bundles moved to expired by the reaper",
        )
        .map_err(|_| MetricsError::Prom)?;
        let reaper_purged_total = IntCounter::new(
            "driftmesh_reaper_purged_total",
            "Expired bundles purged past retention",
        )
        .map_err(|_| MetricsError::Prom)?;
        let eviction_bundles_total = IntCounter::new(
            "driftmesh_eviction_bundles_total",
            "Bundles deleted by eviction",
        )
        .map_err(|_| MetricsError::Prom)?;
        let eviction_bytes_total =
            IntCounter::new("driftmesh_eviction_bytes_total", "Bytes freed by eviction")
                .map_err(|_| MetricsError::Prom)?;
        let sync_served_total =
            IntCounter::new("driftmesh_sync_served_total", "Envelopes served to peers")
                .map_err(|_| MetricsError::Prom)?;
        let sync_denied_total = IntCounter::new(
            "driftmesh_sync_denied_total",
            "Envelopes withheld from peers by policy",
        )
        .map_err(|_| MetricsError::Prom)?;
        let cache_used_bytes =
            IntGauge::new("driftmesh_cache_used_bytes", "Current stored bytes")
                .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(bundles_created_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(intake_stored_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(intake_quarantined_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(intake_dropped_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(reaper_expired_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(reaper_purged_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(eviction_bundles_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(eviction_bytes_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(sync_served_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(sync_denied_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(cache_used_bytes.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            bundles_created_total,
            intake_stored_total,
            intake_quarantined_total,
            intake_dropped_total,
            reaper_expired_total,
            reaper_purged_total,
            eviction_bundles_total,
            eviction_bytes_total,
            sync_served_total,
            sync_denied_total,
            cache_used_bytes,
        })
    }

    /// Fold an eviction report into the counters.
    pub fn record_eviction(&self, report: &crate::core::cache::EvictionReport) {
        self.eviction_bundles_total.inc_by(report.evicted);
        self.eviction_bytes_total.inc_by(report.bytes_freed);
    }
}
