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

//! Wire types for the four sync RPCs.
//!
//! Index entries are authoritative about existence and metadata only, never
//! about content; the authoritative bytes travel as full envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::bundle::Bundle;
use crate::core::policy::PeerDescriptor;
use crate::core::types::{Audience, BundleId, Priority, Queue};

fn default_limit() -> usize {
    256
}

/// Metadata summary of one stored bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSummary {
    /// Content-address.
    pub bundle_id: BundleId,
    /// Relay priority.
    pub priority: Priority,
    /// Carry/receive scope.
    pub audience: Audience,
    /// Application topic.
    pub topic: String,
    /// Tags, ordered as authored.
    pub tags: Vec<String>,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
    /// Stored record size.
    pub size_bytes: u64,
}

impl BundleSummary {
    /// Summarize a stored bundle.
    pub fn of(bundle: &Bundle, size_bytes: u64) -> Self {
        Self {
            bundle_id: bundle.bundle_id,
            priority: bundle.priority,
            audience: bundle.audience,
            topic: bundle.topic.clone(),
            tags: bundle.tags.clone(),
            expires_at: bundle.expires_at,
            size_bytes,
        }
    }
}

/// `POST /sync/index` request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRequest {
    /// Queues to cover; defaults to `outbox`+`pending`.
    #[serde(default)]
    pub queues: Option<Vec<Queue>>,
    /// Maximum entries.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// `POST /sync/index` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexResponse {
    /// Summaries in forwarding order.
    pub entries: Vec<BundleSummary>,
}

/// `POST /sync/request` request: a selective fetch.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    /// Wanted ids.
    pub ids: Vec<BundleId>,
    /// The requesting peer as this node assesses it.
    pub peer: PeerDescriptor,
}

/// `POST /sync/request` response. Denied or vanished ids are simply absent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
    /// Approved envelopes.
    pub bundles: Vec<Bundle>,
}

/// `POST /sync/push` request: unsolicited envelopes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Envelopes to offer.
    pub bundles: Vec<Bundle>,
}

/// Per-bundle outcome of a push.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    /// Claimed id of the pushed envelope.
    pub bundle_id: BundleId,
    /// True when stored into inbox.
    pub accepted: bool,
    /// Reason code when not accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `POST /sync/push` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// One result per pushed envelope, in request order.
    pub results: Vec<PushResult>,
}

/// `POST /sync/pull` request: "give me what I may carry".
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Maximum envelopes.
    #[serde(default = "default_limit")]
    pub max: usize,
    /// The requesting peer as this node assesses it.
    pub peer: PeerDescriptor,
}

/// `POST /sync/pull` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Policy-approved envelopes in forwarding order.
    pub bundles: Vec<Bundle>,
}
