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

//! Sync client: the four RPCs against one peer, each under its configured
//! deadline, plus the index-fetch-store and pull convenience rounds.
//!
//! A timed-out call drops its partial result; the caller retries later.
//! Index entries are hints only - a fetch may legitimately return fewer
//! bundles than asked (expired, evicted, or policy-denied in the meantime),
//! and the rounds tolerate those gaps by construction.

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::bundle::Bundle;
use crate::core::engine::{Engine, EngineError};
use crate::core::intake::Disposition;
use crate::core::policy::PeerDescriptor;
use crate::core::types::{BundleId, EngineConfig, Queue};
use crate::networking::messages::{
    FetchRequest, FetchResponse, IndexRequest, IndexResponse, PullRequest, PullResponse,
    PushRequest, PushResponse, PushResult,
};

pub use crate::networking::messages::BundleSummary;

/// Peer RPC errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Deadline exceeded.
    #[error("peer timeout")]
    Timeout,
    /// Transport or protocol failure.
    #[error("peer protocol")]
    Protocol,
}

impl From<SyncError> for EngineError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Timeout => EngineError::PeerTimeout,
            SyncError::Protocol => EngineError::PeerProtocol,
        }
    }
}

fn map_err(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::Protocol
    }
}

/// HTTP client for one peer's sync listener.
pub struct SyncClient {
    http: reqwest::Client,
    base: String,
    index_deadline: Duration,
    transfer_deadline: Duration,
}

impl SyncClient {
    /// Client for `base_url` (e.g. `http://10.0.0.7:7450`) with the engine's
    /// configured deadlines.
    pub fn new(base_url: impl Into<String>, cfg: &EngineConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|_| SyncError::Protocol)?;
        Ok(Self {
            http,
            base: base_url.into(),
            index_deadline: Duration::from_secs(cfg.index_deadline_secs.max(1)),
            transfer_deadline: Duration::from_secs(cfg.transfer_deadline_secs.max(1)),
        })
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        req: &Req,
        deadline: Duration,
    ) -> Result<Resp, SyncError> {
        let url = format!("{}{path}", self.base);
        let resp = self
            .http
            .post(url)
            .timeout(deadline)
            .json(req)
            .send()
            .await
            .map_err(map_err)?
            .error_for_status()
            .map_err(|_| SyncError::Protocol)?;
        resp.json().await.map_err(map_err)
    }

    /// Ask the peer for an index of its forwardable bundles.
    pub async fn index(
        &self,
        queues: Option<Vec<Queue>>,
        limit: usize,
    ) -> Result<Vec<BundleSummary>, SyncError> {
        let resp: IndexResponse = self
            .post(
                "/sync/index",
                &IndexRequest { queues, limit },
                self.index_deadline,
            )
            .await?;
        Ok(resp.entries)
    }

    /// Selectively fetch envelopes by id. Gaps are expected.
    pub async fn request(
        &self,
        ids: Vec<BundleId>,
        peer: PeerDescriptor,
    ) -> Result<Vec<Bundle>, SyncError> {
        let resp: FetchResponse = self
            .post(
                "/sync/request",
                &FetchRequest { ids, peer },
                self.transfer_deadline,
            )
            .await?;
        Ok(resp.bundles)
    }

    /// Push envelopes at the peer; returns its per-bundle verdicts.
    pub async fn push(&self, bundles: Vec<Bundle>) -> Result<Vec<PushResult>, SyncError> {
        let resp: PushResponse = self
            .post("/sync/push", &PushRequest { bundles }, self.transfer_deadline)
            .await?;
        Ok(resp.results)
    }

    /// Ask the peer for the next bundles it believes we may carry.
    pub async fn pull(
        &self,
        max: usize,
        peer: PeerDescriptor,
    ) -> Result<Vec<Bundle>, SyncError> {
        let resp: PullResponse = self
            .post("/sync/pull", &PullRequest { max, peer }, self.transfer_deadline)
            .await?;
        Ok(resp.bundles)
    }
}

/// Tally of one sync round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Envelopes received from the peer.
    pub received: u64,
    /// Stored into inbox.
    pub stored: u64,
    /// Quarantined.
    pub quarantined: u64,
    /// Dropped (expired/duplicate/over-budget).
    pub dropped: u64,
}

fn tally(outcome: &mut SyncOutcome, disposition: Disposition) {
    outcome.received += 1;
    match disposition {
        Disposition::Stored => outcome.stored += 1,
        Disposition::Quarantined(_) => outcome.quarantined += 1,
        Disposition::Dropped(_) => outcome.dropped += 1,
    }
}

/// One index-fetch-store round against a peer.
///
/// `self_descriptor` is how the caller presents this node to the peer; the
/// peer enforces its own policy with it.
pub async fn sync_round(
    engine: &Engine,
    client: &SyncClient,
    self_descriptor: &PeerDescriptor,
    max: usize,
) -> Result<SyncOutcome, EngineError> {
    let entries = client.index(None, max).await?;
    let now = Utc::now();

    let mut want = Vec::new();
    for entry in entries {
        if entry.expires_at <= now {
            continue;
        }
        if engine.store().locations(&entry.bundle_id)?.is_empty() {
            want.push(entry.bundle_id);
        }
    }
    debug!(wanted = want.len(), "index round complete");
    if want.is_empty() {
        return Ok(SyncOutcome::default());
    }

    let bundles = client.request(want, self_descriptor.clone()).await?;
    let mut outcome = SyncOutcome::default();
    for bundle in bundles {
        tally(&mut outcome, engine.receive(bundle)?);
    }
    info!(
        received = outcome.received,
        stored = outcome.stored,
        "sync round complete"
    );
    Ok(outcome)
}

/// One pull round: take what the peer offers, store what survives intake.
pub async fn pull_round(
    engine: &Engine,
    client: &SyncClient,
    self_descriptor: &PeerDescriptor,
    max: usize,
) -> Result<SyncOutcome, EngineError> {
    let bundles = client.pull(max, self_descriptor.clone()).await?;
    let mut outcome = SyncOutcome::default();
    for bundle in bundles {
        tally(&mut outcome, engine.receive(bundle)?);
    }
    info!(
        received = outcome.received,
        stored = outcome.stored,
        "pull round complete"
    );
    Ok(outcome)
}
