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

//! Forwarding policy: a pure, deterministic decision function plus the total
//! forwarding order used when offering bundles to a peer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::core::bundle::Bundle;
use crate::core::types::{Audience, Priority, Queue};

/// What a forwarding opportunity knows about the peer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// True when the peer sits on the same access-point island.
    pub is_local: bool,
    /// Trust assessment in [0, 1], supplied by the trust fabric.
    pub trust_score: f64,
    /// Optional peer identity (fingerprint).
    #[serde(default)]
    pub node_id: Option<String>,
}

/// Why a bundle may not be forwarded to a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Quarantined or already expired queue; never leaves the node.
    NotForwardable,
    /// TTL has passed.
    Expired,
    /// Hop budget exhausted.
    HopLimit,
    /// Audience gate failed for this peer.
    Audience,
}

/// Forwarding decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The bundle may be sent to this peer.
    Allow,
    /// The bundle must not be sent to this peer.
    Deny(DenyReason),
}

impl Decision {
    /// True for `Allow`.
    pub fn is_allow(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Evaluate whether `bundle`, currently held in `queue`, may be forwarded to
/// `peer`. Rules run in order; first match wins.
pub fn evaluate(
    bundle: &Bundle,
    queue: Queue,
    peer: &PeerDescriptor,
    now: DateTime<Utc>,
    trust_threshold: f64,
) -> Decision {
    if matches!(queue, Queue::Quarantine | Queue::Expired) {
        return Decision::Deny(DenyReason::NotForwardable);
    }
    if bundle.is_expired(now) {
        return Decision::Deny(DenyReason::Expired);
    }
    if bundle.hop_count >= bundle.hop_limit {
        return Decision::Deny(DenyReason::HopLimit);
    }
    match bundle.audience {
        Audience::Public => Decision::Allow,
        Audience::Local if peer.is_local => Decision::Allow,
        Audience::Local => Decision::Deny(DenyReason::Audience),
        Audience::Trusted if peer.trust_score >= trust_threshold => Decision::Allow,
        Audience::Trusted => Decision::Deny(DenyReason::Audience),
        // Recipient-directed delivery is a declared slot without crypto yet.
        Audience::Private => Decision::Deny(DenyReason::Audience),
    }
}

/// Audience refinement inside `Normal`: trusted/private traffic outranks
/// public/local. Other priorities ignore audience.
fn audience_class(b: &Bundle) -> u8 {
    if b.priority != Priority::Normal {
        return 0;
    }
    match b.audience {
        Audience::Trusted | Audience::Private => 0,
        Audience::Public | Audience::Local => 1,
    }
}

/// The total forwarding order: priority descending, the audience refinement
/// within `Normal`, then oldest first. Ties broken by id for determinism.
pub fn forwarding_cmp(a: &Bundle, b: &Bundle) -> Ordering {
    a.priority
        .index_rank()
        .cmp(&b.priority.index_rank())
        .then(audience_class(a).cmp(&audience_class(b)))
        .then(a.created_at.cmp(&b.created_at))
        .then(a.bundle_id.cmp(&b.bundle_id))
}
