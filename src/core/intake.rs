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

//! Intake pipeline: every bundle received from a peer passes through here.
//!
//! Check order is load-bearing: identity, then signature, then structure,
//! then expiry, then duplication, then budget. Authenticity failures
//! quarantine the envelope as received; expired, duplicate, and over-budget
//! arrivals are dropped without storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::core::bundle::Bundle;
use crate::core::cache::{CacheBudget, CacheError};
use crate::core::codec::encode_record;
use crate::core::security::keystore;
use crate::core::store::{QueueStore, StoreError};
use crate::core::types::{PublicKey, Queue};
use crate::monitoring::metrics::Metrics;

/// Why an envelope was quarantined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectKind {
    /// Claimed id does not match the content hash.
    Tampered,
    /// Signature does not verify against the embedded key.
    BadSignature,
    /// Structural invariant violated.
    MalformedEnvelope,
}

/// Why an envelope was dropped without storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropKind {
    /// TTL already past.
    Expired,
    /// Already known.
    Duplicate,
    /// No room and eviction could not free enough.
    OverBudget,
}

/// Terminal state of one received bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Stored into inbox.
    Stored,
    /// Stored into quarantine.
    Quarantined(RejectKind),
    /// Not stored.
    Dropped(DropKind),
}

impl Disposition {
    /// True only for `Stored`.
    pub fn accepted(self) -> bool {
        matches!(self, Disposition::Stored)
    }

    /// Stable reason code for wire reporting; `None` when stored.
    pub fn reason_code(self) -> Option<&'static str> {
        match self {
            Disposition::Stored => None,
            Disposition::Quarantined(RejectKind::Tampered) => Some("tampered"),
            Disposition::Quarantined(RejectKind::BadSignature) => Some("bad_signature"),
            Disposition::Quarantined(RejectKind::MalformedEnvelope) => Some("malformed_envelope"),
            Disposition::Dropped(DropKind::Expired) => Some("expired"),
            Disposition::Dropped(DropKind::Duplicate) => Some("duplicate"),
            Disposition::Dropped(DropKind::OverBudget) => Some("over_budget"),
        }
    }
}

/// Everything intake needs from the engine.
pub struct Intake<'a> {
    /// Queue store.
    pub store: &'a QueueStore,
    /// Budget manager.
    pub cache: &'a CacheBudget,
    /// Counters.
    pub metrics: &'a Metrics,
    /// This node's key (eviction protection).
    pub node_key: &'a PublicKey,
    /// Payload size bound.
    pub max_payload_bytes: usize,
}

impl Intake<'_> {
    /// Run one received envelope through the pipeline.
    pub fn receive(&self, bundle: Bundle, now: DateTime<Utc>) -> Result<Disposition, StoreError> {
        let claimed = bundle.bundle_id;

        let region = match bundle.canonical_bytes() {
            Ok(r) => r,
            Err(_) => return self.quarantine(bundle, RejectKind::MalformedEnvelope),
        };
        let digest = ring::digest::digest(&ring::digest::SHA256, &region);
        let matches: bool = digest.as_ref().ct_eq(claimed.as_bytes()).into();
        if !matches {
            return self.quarantine(bundle, RejectKind::Tampered);
        }

        if keystore::verify(&bundle.author_public_key, &region, &bundle.signature).is_err() {
            return self.quarantine(bundle, RejectKind::BadSignature);
        }

        if let Err(reason) = bundle.check_structure(self.max_payload_bytes) {
            debug!(id = %claimed, reason, "malformed envelope");
            return self.quarantine(bundle, RejectKind::MalformedEnvelope);
        }

        if bundle.is_expired(now) {
            self.metrics.intake_dropped_total.inc();
            return Ok(Disposition::Dropped(DropKind::Expired));
        }

        if self
            .store
            .exists_in(&claimed, &[Queue::Inbox, Queue::Quarantine])?
        {
            self.metrics.intake_dropped_total.inc();
            return Ok(Disposition::Dropped(DropKind::Duplicate));
        }

        let size = match encode_record(&bundle) {
            Ok(r) => r.len() as u64,
            Err(_) => return self.quarantine(bundle, RejectKind::MalformedEnvelope),
        };
        match self.cache.admit(self.store, size, self.node_key) {
            Ok(report) => self.metrics.record_eviction(&report),
            Err(CacheError::OverBudget) => {
                warn!(id = %claimed, size, "over budget, dropping inbound bundle");
                self.metrics.intake_dropped_total.inc();
                return Ok(Disposition::Dropped(DropKind::OverBudget));
            }
            Err(CacheError::Store(e)) => return Err(e),
        }

        // The wire transfer was a relay hop: the stored copy carries it.
        let mut stored = bundle;
        stored.hop_count = stored.hop_count.saturating_add(1).min(stored.hop_limit);

        match self.store.create(&stored, Queue::Inbox) {
            Ok(_) => {
                self.metrics.intake_stored_total.inc();
                debug!(id = %claimed, hops = stored.hop_count, "bundle stored");
                Ok(Disposition::Stored)
            }
            Err(StoreError::Duplicate) => {
                self.metrics.intake_dropped_total.inc();
                Ok(Disposition::Dropped(DropKind::Duplicate))
            }
            Err(e) => Err(e),
        }
    }

    fn quarantine(&self, bundle: Bundle, kind: RejectKind) -> Result<Disposition, StoreError> {
        let id = bundle.bundle_id;
        let size = encode_record(&bundle).map(|r| r.len() as u64).unwrap_or(0);
        match self.cache.admit(self.store, size, self.node_key) {
            Ok(report) => self.metrics.record_eviction(&report),
            Err(CacheError::OverBudget) => {
                warn!(id = %id, "over budget, dropping instead of quarantining");
                self.metrics.intake_dropped_total.inc();
                return Ok(Disposition::Dropped(DropKind::OverBudget));
            }
            Err(CacheError::Store(e)) => return Err(e),
        }
        match self.store.create(&bundle, Queue::Quarantine) {
            Ok(_) => {
                self.metrics.intake_quarantined_total.inc();
                warn!(id = %id, ?kind, "bundle quarantined");
                Ok(Disposition::Quarantined(kind))
            }
            Err(StoreError::Duplicate) => {
                self.metrics.intake_dropped_total.inc();
                Ok(Disposition::Dropped(DropKind::Duplicate))
            }
            Err(e) => Err(e),
        }
    }
}
