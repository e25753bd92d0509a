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

//! The engine value: one handle owning the store, signer, budget, and
//! counters, threaded explicitly through every handler. No global state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::core::bundle::{build_signed, Bundle, BundleError, NewBundle};
use crate::core::cache::{CacheBudget, CacheError};
use crate::core::codec::encode_record;
use crate::core::intake::{Disposition, Intake};
use crate::core::policy::{self, PeerDescriptor};
use crate::core::security::keystore::{FileEd25519Backend, Keystore, KeystoreError};
use crate::core::store::{QueueStore, StoreError};
use crate::core::types::{BundleId, EngineConfig, NodeConfig, Queue};
use crate::monitoring::metrics::{Metrics, MetricsError};

/// The flat engine error taxonomy.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Structural violation; signature not even attempted.
    #[error("malformed envelope")]
    MalformedEnvelope,
    /// Cryptographic verification failed.
    #[error("bad signature")]
    BadSignature,
    /// Claimed id does not match the content hash.
    #[error("tampered")]
    Tampered,
    /// TTL already past.
    #[error("expired")]
    Expired,
    /// Hop budget exhausted.
    #[error("hop limit")]
    HopLimit,
    /// Already known.
    #[error("duplicate")]
    Duplicate,
    /// No room and eviction could not free enough.
    #[error("over budget")]
    OverBudget,
    /// Referenced id is absent.
    #[error("not found")]
    NotFound,
    /// Move between incompatible queues.
    #[error("illegal transition")]
    IllegalTransition,
    /// Forwarding policy refused.
    #[error("policy deny")]
    PolicyDeny,
    /// Peer RPC deadline exceeded.
    #[error("peer timeout")]
    PeerTimeout,
    /// Peer spoke the protocol wrong.
    #[error("peer protocol")]
    PeerProtocol,
    /// Durable layer failure.
    #[error("store")]
    Store,
    /// Key material failure.
    #[error("keystore")]
    Keystore,
    /// Metrics registry failure.
    #[error("metrics")]
    Metrics,
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate => EngineError::Duplicate,
            StoreError::NotFound => EngineError::NotFound,
            _ => EngineError::Store,
        }
    }
}

impl From<CacheError> for EngineError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::OverBudget => EngineError::OverBudget,
            CacheError::Store(s) => s.into(),
        }
    }
}

impl From<BundleError> for EngineError {
    fn from(e: BundleError) -> Self {
        match e {
            BundleError::Malformed(_) | BundleError::Codec => EngineError::MalformedEnvelope,
            BundleError::Keystore => EngineError::Keystore,
        }
    }
}

impl From<KeystoreError> for EngineError {
    fn from(_: KeystoreError) -> Self {
        EngineError::Keystore
    }
}

impl From<MetricsError> for EngineError {
    fn from(_: MetricsError) -> Self {
        EngineError::Metrics
    }
}

/// Node identity as reported to applications and tooling.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// Armored Ed25519 public key.
    pub node_public_key: String,
    /// Short digest of the public key.
    pub fingerprint: String,
}

/// Per-queue bundle counts.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct QueueCounts {
    /// inbox
    pub inbox: u64,
    /// outbox
    pub outbox: u64,
    /// pending
    pub pending: u64,
    /// delivered
    pub delivered: u64,
    /// expired
    pub expired: u64,
    /// quarantine
    pub quarantine: u64,
}

/// Engine observation snapshot.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    /// Bundles per queue.
    pub queues: QueueCounts,
    /// Bytes currently stored.
    pub cache_used_bytes: u64,
    /// Configured budget.
    pub cache_budget_bytes: u64,
    /// Bundles created locally.
    pub created: u64,
    /// Inbound stored.
    pub intake_stored: u64,
    /// Inbound quarantined.
    pub intake_quarantined: u64,
    /// Inbound dropped.
    pub intake_dropped: u64,
    /// Moved to expired by the reaper.
    pub reaper_expired: u64,
    /// Purged past retention.
    pub reaper_purged: u64,
    /// Deleted by eviction.
    pub evicted: u64,
    /// Served to peers.
    pub sync_served: u64,
    /// Withheld from peers by policy.
    pub sync_denied: u64,
}

/// Queues a fetch is willing to serve from, in preference order: the
/// authored copy first, then staged and relayed copies.
const SERVE_ORDER: [Queue; 4] = [Queue::Outbox, Queue::Pending, Queue::Inbox, Queue::Delivered];

/// The engine.
#[derive(Clone)]
pub struct Engine {
    store: QueueStore,
    keystore: Arc<Keystore<FileEd25519Backend>>,
    cache: CacheBudget,
    metrics: Arc<Metrics>,
    cfg: EngineConfig,
}

impl Engine {
    /// Open (or initialize) an engine under the configured data directory.
    pub fn open(cfg: &NodeConfig) -> Result<Self, EngineError> {
        let data_dir = PathBuf::from(&cfg.node.data_dir);
        std::fs::create_dir_all(&data_dir).map_err(|_| EngineError::Store)?;

        let key_path = cfg
            .engine
            .key_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("node.key"));
        let keystore = Keystore::open(&key_path)?;

        let store = QueueStore::open(&data_dir.join("db"))?;
        let metrics = Metrics::new()?;
        let engine = Self {
            store,
            keystore: Arc::new(keystore),
            cache: CacheBudget::new(cfg.engine.cache_bytes_budget),
            metrics: Arc::new(metrics),
            cfg: cfg.engine.clone(),
        };
        engine.refresh_cache_gauge();
        info!(
            fingerprint = %engine.keystore.node_fingerprint(),
            data_dir = %data_dir.display(),
            "engine opened"
        );
        Ok(engine)
    }

    /// The queue store.
    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    /// The metrics registry.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Push the current stored-bytes figure into the gauge.
    pub fn refresh_cache_gauge(&self) {
        if let Ok(total) = self.store.total_bytes() {
            self.metrics.cache_used_bytes.set(total.min(i64::MAX as u64) as i64);
        }
    }

    /// Construct, sign, and store a bundle into `outbox`.
    pub fn create_bundle(&self, new: NewBundle) -> Result<BundleId, EngineError> {
        let bundle = build_signed(
            new,
            &self.keystore,
            Utc::now(),
            self.cfg.default_hop_limit,
            self.cfg.max_payload_bytes,
        )?;

        let size = encode_record(&bundle)
            .map_err(|_| EngineError::MalformedEnvelope)?
            .len() as u64;
        let report = self
            .cache
            .admit(&self.store, size, &self.keystore.node_public_key())?;
        self.metrics.record_eviction(&report);

        self.store.create(&bundle, Queue::Outbox)?;
        self.metrics.bundles_created_total.inc();
        self.refresh_cache_gauge();
        info!(id = %bundle.bundle_id, priority = bundle.priority.as_str(), "bundle created");
        Ok(bundle.bundle_id)
    }

    /// Bundles in a queue, priority descending then oldest first.
    pub fn list_queue(
        &self,
        queue: Queue,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Bundle>, EngineError> {
        Ok(self.store.list(queue, limit, offset)?)
    }

    /// Fetch a bundle by id.
    pub fn get_bundle(&self, id: &BundleId) -> Result<Bundle, EngineError> {
        match self.store.get(id)? {
            Some((_, b)) => Ok(b),
            None => Err(EngineError::NotFound),
        }
    }

    /// Stage an authored bundle for forwarding: `outbox` -> `pending`.
    ///
    /// A relayed echo of the same id in `inbox` is collapsed first, so the
    /// only legal double-residence never outlives the outbox copy.
    pub fn to_pending(&self, id: &BundleId) -> Result<(), EngineError> {
        let held = self.held_queues(id)?;
        if !held.contains(&Queue::Outbox) {
            return Err(EngineError::IllegalTransition);
        }
        if held.contains(&Queue::Inbox) {
            self.store.delete_from(id, Queue::Inbox)?;
        }
        self.store.move_bundle(id, Queue::Outbox, Queue::Pending)?;
        Ok(())
    }

    /// Record delivery: `inbox` -> `delivered`.
    ///
    /// For a self-authored bundle that echoed back, the authored copy is the
    /// one that graduates; the echo is collapsed.
    pub fn mark_delivered(&self, id: &BundleId) -> Result<(), EngineError> {
        let held = self.held_queues(id)?;
        if !held.contains(&Queue::Inbox) {
            return Err(EngineError::IllegalTransition);
        }
        if held.contains(&Queue::Outbox) {
            self.store.delete_from(id, Queue::Inbox)?;
            self.store.move_bundle(id, Queue::Outbox, Queue::Delivered)?;
        } else {
            self.store.move_bundle(id, Queue::Inbox, Queue::Delivered)?;
        }
        Ok(())
    }

    fn held_queues(&self, id: &BundleId) -> Result<Vec<Queue>, EngineError> {
        let locations = self.store.locations(id)?;
        if locations.is_empty() {
            return Err(EngineError::NotFound);
        }
        Ok(locations.into_iter().map(|(q, _)| q).collect())
    }

    /// Node identity.
    pub fn node_info(&self) -> NodeInfo {
        NodeInfo {
            node_public_key: self.keystore.node_public_key().armored(),
            fingerprint: self.keystore.node_fingerprint(),
        }
    }

    /// Observation snapshot.
    pub fn stats(&self) -> Result<EngineStats, EngineError> {
        let queues = QueueCounts {
            inbox: self.store.count(Queue::Inbox)?,
            outbox: self.store.count(Queue::Outbox)?,
            pending: self.store.count(Queue::Pending)?,
            delivered: self.store.count(Queue::Delivered)?,
            expired: self.store.count(Queue::Expired)?,
            quarantine: self.store.count(Queue::Quarantine)?,
        };
        let m = &self.metrics;
        Ok(EngineStats {
            queues,
            cache_used_bytes: self.store.total_bytes()?,
            cache_budget_bytes: self.cache.budget_bytes(),
            created: m.bundles_created_total.get(),
            intake_stored: m.intake_stored_total.get(),
            intake_quarantined: m.intake_quarantined_total.get(),
            intake_dropped: m.intake_dropped_total.get(),
            reaper_expired: m.reaper_expired_total.get(),
            reaper_purged: m.reaper_purged_total.get(),
            evicted: m.eviction_bundles_total.get(),
            sync_served: m.sync_served_total.get(),
            sync_denied: m.sync_denied_total.get(),
        })
    }

    /// Run a received envelope through the intake pipeline.
    pub fn receive(&self, bundle: Bundle) -> Result<Disposition, EngineError> {
        let node_key = self.keystore.node_public_key();
        let intake = Intake {
            store: &self.store,
            cache: &self.cache,
            metrics: &self.metrics,
            node_key: &node_key,
            max_payload_bytes: self.cfg.max_payload_bytes,
        };
        let disposition = intake.receive(bundle, Utc::now())?;
        self.refresh_cache_gauge();
        Ok(disposition)
    }

    /// Forwarding-ordered snapshot of the given queues (default
    /// `outbox`+`pending`) with stored sizes, for index exchange.
    pub fn forwarding_snapshot(
        &self,
        queues: Option<&[Queue]>,
        limit: usize,
    ) -> Result<Vec<(Queue, Bundle, u64)>, EngineError> {
        let default = [Queue::Outbox, Queue::Pending];
        let queues = queues.unwrap_or(&default);

        let mut all: Vec<(Queue, Bundle, u64)> = Vec::new();
        for &queue in queues {
            for bundle in self.store.list(queue, usize::MAX, 0)? {
                let size = self
                    .store
                    .locations(&bundle.bundle_id)?
                    .into_iter()
                    .find(|(q, _)| *q == queue)
                    .map(|(_, s)| s)
                    .unwrap_or(0);
                all.push((queue, bundle, size));
            }
        }
        all.sort_by(|a, b| policy::forwarding_cmp(&a.1, &b.1));
        all.truncate(limit);
        Ok(all)
    }

    /// Locate the copy of `id` a fetch may serve, preferring the authored one.
    fn serve_copy(&self, id: &BundleId) -> Result<Option<(Queue, Bundle)>, EngineError> {
        let locations = self.store.locations(id)?;
        for queue in SERVE_ORDER {
            if locations.iter().any(|(q, _)| *q == queue) {
                if let Some(b) = self.store.get_in(queue, id)? {
                    return Ok(Some((queue, b)));
                }
            }
        }
        Ok(None)
    }

    /// Serve a selective fetch: for each id, return the envelope iff it still
    /// exists, is not expired or quarantined, and passes policy for `peer`.
    /// Failing ids are omitted silently.
    pub fn serve_request(
        &self,
        ids: &[BundleId],
        peer: &PeerDescriptor,
        now: DateTime<Utc>,
    ) -> Result<Vec<Bundle>, EngineError> {
        let mut out = Vec::new();
        for id in ids {
            let Some((queue, bundle)) = self.serve_copy(id)? else {
                continue;
            };
            if policy::evaluate(&bundle, queue, peer, now, self.cfg.trust_threshold).is_allow() {
                self.metrics.sync_served_total.inc();
                out.push(bundle);
            } else {
                self.metrics.sync_denied_total.inc();
            }
        }
        Ok(out)
    }

    /// Serve a pull: up to `max` policy-approved bundles in forwarding order.
    pub fn serve_pull(
        &self,
        max: usize,
        peer: &PeerDescriptor,
        now: DateTime<Utc>,
    ) -> Result<Vec<Bundle>, EngineError> {
        let mut out = Vec::new();
        for (queue, bundle, _) in self.forwarding_snapshot(None, usize::MAX)? {
            if out.len() >= max {
                break;
            }
            if policy::evaluate(&bundle, queue, peer, now, self.cfg.trust_threshold).is_allow() {
                self.metrics.sync_served_total.inc();
                out.push(bundle);
            } else {
                self.metrics.sync_denied_total.inc();
            }
        }
        Ok(out)
    }

    /// Flush the store (shutdown path).
    pub fn shutdown(&self) {
        if self.store.flush().is_err() {
            tracing::warn!("store flush failed on shutdown");
        }
    }
}
