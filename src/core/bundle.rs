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

//! The bundle model: envelope record, canonical region, TTL defaults,
//! signed construction.
//!
//! Identity rule: `bundle_id` is the SHA-256 of the canonical encoding of
//! every field except `bundle_id` itself, `signature`, and `hop_count`. The
//! signature covers exactly the same bytes. `hop_count` stays outside both so
//! relays can advance it without breaking identity or authentication.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::codec::{canonical_json, CodecError};
use crate::core::security::keystore::{Keystore, KeystoreError, SignerBackend};
use crate::core::types::{
    Audience, BundleId, Payload, Priority, PublicKey, ReceiptPolicy, Signature,
};

/// Upper bound on topic and payload-type strings.
pub const MAX_NAME_CHARS: usize = 64;
/// Upper bound on a single tag.
pub const MAX_TAG_CHARS: usize = 32;
/// Upper bound on the tag list.
pub const MAX_TAGS: usize = 16;

/// The signed, content-addressed envelope carrying one application payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Content-address. Derived, never assigned.
    pub bundle_id: BundleId,
    /// Instant the author constructed the bundle (UTC).
    pub created_at: DateTime<Utc>,
    /// Instant after which the bundle is worthless. Strictly after `created_at`.
    pub expires_at: DateTime<Utc>,
    /// Relay priority.
    pub priority: Priority,
    /// Carry/receive scope.
    pub audience: Audience,
    /// Application-assigned topic, e.g. `mutual-aid`.
    pub topic: String,
    /// Ordered short strings; drive TTL defaulting and peer-side filtering.
    pub tags: Vec<String>,
    /// Name of the payload schema, e.g. `vf:Listing`. Opaque to the engine.
    pub payload_type: String,
    /// Opaque application bytes.
    pub payload: Payload,
    /// Author's maximum relay count.
    pub hop_limit: u32,
    /// Relays so far. Excluded from identity and signature.
    pub hop_count: u32,
    /// Author's receipt interest. Informational.
    pub receipt_policy: ReceiptPolicy,
    /// Detached signature over the canonical region.
    pub signature: Signature,
    /// The author's Ed25519 public key.
    pub author_public_key: PublicKey,
}

/// The canonical region: every identity-bearing field of a bundle.
///
/// Field declaration order IS the canonical key order; keep it lexicographic
/// over the camelCase wire names when editing.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalRegion<'a> {
    audience: Audience,
    author_public_key: &'a PublicKey,
    created_at: &'a DateTime<Utc>,
    expires_at: &'a DateTime<Utc>,
    hop_limit: u32,
    payload: &'a Payload,
    payload_type: &'a str,
    priority: Priority,
    receipt_policy: ReceiptPolicy,
    tags: &'a [String],
    topic: &'a str,
}

impl Bundle {
    /// Canonical bytes of the region both hashed and signed.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CodecError> {
        canonical_json(&CanonicalRegion {
            audience: self.audience,
            author_public_key: &self.author_public_key,
            created_at: &self.created_at,
            expires_at: &self.expires_at,
            hop_limit: self.hop_limit,
            payload: &self.payload,
            payload_type: &self.payload_type,
            priority: self.priority,
            receipt_policy: self.receipt_policy,
            tags: &self.tags,
            topic: &self.topic,
        })
    }

    /// Recompute the content-address from the canonical region.
    pub fn computed_id(&self) -> Result<BundleId, CodecError> {
        Ok(hash_region(&self.canonical_bytes()?))
    }

    /// True once `expires_at` is at or before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Structural invariants that hold for any well-formed envelope.
    ///
    /// Returns a short reason on violation; cryptographic checks are the
    /// intake pipeline's job.
    pub fn check_structure(&self, max_payload_bytes: usize) -> Result<(), &'static str> {
        if self.created_at >= self.expires_at {
            return Err("createdAt must precede expiresAt");
        }
        if self.hop_count > self.hop_limit {
            return Err("hopCount exceeds hopLimit");
        }
        if self.payload.len() > max_payload_bytes {
            return Err("payload too large");
        }
        check_name(&self.topic, MAX_NAME_CHARS)?;
        check_name(&self.payload_type, MAX_NAME_CHARS)?;
        if self.tags.len() > MAX_TAGS {
            return Err("too many tags");
        }
        for tag in &self.tags {
            check_name(tag, MAX_TAG_CHARS)?;
        }
        if self.signature.0.len() != 64 {
            return Err("signature must be 64 bytes");
        }
        Ok(())
    }

    /// Remaining lifetime relative to `now` (zero when already expired).
    pub fn time_to_live(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

fn check_name(s: &str, max: usize) -> Result<(), &'static str> {
    if s.is_empty() || s.chars().count() > max {
        return Err("name length out of range");
    }
    if s.chars().any(|c| c.is_control()) {
        return Err("control character in name");
    }
    Ok(())
}

fn hash_region(canonical: &[u8]) -> BundleId {
    let digest = ring::digest::digest(&ring::digest::SHA256, canonical);
    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_ref());
    BundleId::from_digest(out)
}

/// Bundle construction errors.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("malformed envelope: {0}")]
    Malformed(&'static str),
    #[error("codec")]
    Codec,
    #[error("keystore")]
    Keystore,
}

impl From<CodecError> for BundleError {
    fn from(_: CodecError) -> Self {
        BundleError::Codec
    }
}

impl From<KeystoreError> for BundleError {
    fn from(_: KeystoreError) -> Self {
        BundleError::Keystore
    }
}

/// Application inputs to bundle construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBundle {
    /// Relay priority.
    pub priority: Priority,
    /// Carry/receive scope.
    pub audience: Audience,
    /// Application topic.
    pub topic: String,
    /// Tags, ordered as given.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Payload schema name.
    pub payload_type: String,
    /// Payload bytes.
    pub payload: Payload,
    /// Explicit expiry; overrides all TTL defaults.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Explicit hop limit; engine default applies when absent.
    #[serde(default)]
    pub hop_limit: Option<u32>,
    /// Receipt interest.
    pub receipt_policy: ReceiptPolicy,
}

/// Default TTL when the author gives no explicit expiry.
///
/// Triggers are checked in order; first match wins.
pub fn default_ttl(priority: Priority, topic: &str, tags: &[String]) -> Duration {
    let has = |t: &str| tags.iter().any(|x| x == t);
    if priority == Priority::Emergency {
        return Duration::hours(12);
    }
    if priority == Priority::Perishable || has("food") || has("perishable") {
        return Duration::hours(48);
    }
    match topic {
        "mutual-aid" => return Duration::hours(48),
        "coordination" => return Duration::days(7),
        "inventory" => return Duration::days(30),
        "knowledge" | "education" => return Duration::days(270),
        _ => {}
    }
    if has("index") {
        return Duration::days(3);
    }
    if priority == Priority::Low {
        return Duration::days(3);
    }
    Duration::days(7)
}

/// Construct, sign, and address a bundle from application inputs.
pub fn build_signed<B: SignerBackend>(
    new: NewBundle,
    keystore: &Keystore<B>,
    now: DateTime<Utc>,
    default_hop_limit: u32,
    max_payload_bytes: usize,
) -> Result<Bundle, BundleError> {
    let created_at = now;
    let expires_at = match new.expires_at {
        Some(t) => t,
        None => created_at + default_ttl(new.priority, &new.topic, &new.tags),
    };

    let mut bundle = Bundle {
        // Placeholder until the region is hashed below.
        bundle_id: BundleId::from_digest([0u8; 32]),
        created_at,
        expires_at,
        priority: new.priority,
        audience: new.audience,
        topic: new.topic,
        tags: new.tags,
        payload_type: new.payload_type,
        payload: new.payload,
        hop_limit: new.hop_limit.unwrap_or(default_hop_limit),
        hop_count: 0,
        receipt_policy: new.receipt_policy,
        signature: Signature(vec![0u8; 64]),
        author_public_key: keystore.node_public_key(),
    };

    bundle
        .check_structure(max_payload_bytes)
        .map_err(BundleError::Malformed)?;

    let region = bundle.canonical_bytes()?;
    bundle.bundle_id = hash_region(&region);
    bundle.signature = keystore.sign(&region)?;
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::security::keystore;

    fn test_keystore() -> (tempfile::TempDir, Keystore<keystore::FileEd25519Backend>) {
        let dir = tempfile::tempdir().unwrap();
        let ks = Keystore::open(&dir.path().join("node.key")).unwrap();
        (dir, ks)
    }

    fn listing(priority: Priority, topic: &str, tags: &[&str]) -> NewBundle {
        NewBundle {
            priority,
            audience: Audience::Public,
            topic: topic.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            payload_type: "vf:Listing".to_string(),
            payload: Payload(b"{\"offer\":\"tomatoes\"}".to_vec()),
            expires_at: None,
            hop_limit: None,
            receipt_policy: ReceiptPolicy::None,
        }
    }

    #[test]
    fn ttl_default_table() {
        let cases: &[(Priority, &str, &[&str], i64)] = &[
            (Priority::Emergency, "coordination", &[], 12),
            (Priority::Perishable, "whatever", &[], 48),
            (Priority::Normal, "whatever", &["food"], 48),
            (Priority::Normal, "mutual-aid", &[], 48),
            (Priority::Normal, "coordination", &[], 7 * 24),
            (Priority::Normal, "inventory", &[], 30 * 24),
            (Priority::Normal, "knowledge", &[], 270 * 24),
            (Priority::Normal, "education", &[], 270 * 24),
            (Priority::Normal, "whatever", &["index"], 3 * 24),
            (Priority::Low, "whatever", &[], 3 * 24),
            (Priority::Normal, "whatever", &[], 7 * 24),
        ];
        for (priority, topic, tags, hours) in cases {
            let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
            assert_eq!(
                default_ttl(*priority, topic, &tags),
                Duration::hours(*hours),
                "{priority:?}/{topic}/{tags:?}"
            );
        }
    }

    #[test]
    fn emergency_gets_twelve_hours() {
        let (_d, ks) = test_keystore();
        let b = build_signed(
            listing(Priority::Emergency, "coordination", &[]),
            &ks,
            Utc::now(),
            20,
            1 << 20,
        )
        .unwrap();
        assert_eq!(b.expires_at - b.created_at, Duration::hours(12));
    }

    #[test]
    fn explicit_expiry_overrides_defaults() {
        let (_d, ks) = test_keystore();
        let now = Utc::now();
        let mut input = listing(Priority::Emergency, "coordination", &[]);
        input.expires_at = Some(now + Duration::minutes(5));
        let b = build_signed(input, &ks, now, 20, 1 << 20).unwrap();
        assert_eq!(b.expires_at, now + Duration::minutes(5));
    }

    #[test]
    fn id_matches_content_and_signature_verifies() {
        let (_d, ks) = test_keystore();
        let b = build_signed(
            listing(Priority::Normal, "mutual-aid", &["food"]),
            &ks,
            Utc::now(),
            20,
            1 << 20,
        )
        .unwrap();
        assert_eq!(b.computed_id().unwrap(), b.bundle_id);
        keystore::verify(
            &b.author_public_key,
            &b.canonical_bytes().unwrap(),
            &b.signature,
        )
        .unwrap();
        b.check_structure(1 << 20).unwrap();
        assert_eq!(b.hop_count, 0);
    }

    #[test]
    fn payload_mutation_changes_id() {
        let (_d, ks) = test_keystore();
        let mut b = build_signed(
            listing(Priority::Normal, "mutual-aid", &[]),
            &ks,
            Utc::now(),
            20,
            1 << 20,
        )
        .unwrap();
        let original = b.bundle_id;
        b.payload.0[0] ^= 1;
        assert_ne!(b.computed_id().unwrap(), original);
    }

    #[test]
    fn hop_count_is_outside_identity() {
        let (_d, ks) = test_keystore();
        let mut b = build_signed(
            listing(Priority::Normal, "mutual-aid", &[]),
            &ks,
            Utc::now(),
            20,
            1 << 20,
        )
        .unwrap();
        let original = b.bundle_id;
        b.hop_count = 5;
        assert_eq!(b.computed_id().unwrap(), original);
        keystore::verify(
            &b.author_public_key,
            &b.canonical_bytes().unwrap(),
            &b.signature,
        )
        .unwrap();
    }

    #[test]
    fn rejects_backwards_expiry() {
        let (_d, ks) = test_keystore();
        let now = Utc::now();
        let mut input = listing(Priority::Normal, "mutual-aid", &[]);
        input.expires_at = Some(now - Duration::hours(1));
        assert!(matches!(
            build_signed(input, &ks, now, 20, 1 << 20),
            Err(BundleError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_oversized_payload() {
        let (_d, ks) = test_keystore();
        let mut input = listing(Priority::Normal, "mutual-aid", &[]);
        input.payload = Payload(vec![0u8; 2048]);
        assert!(matches!(
            build_signed(input, &ks, Utc::now(), 20, 1024),
            Err(BundleError::Malformed(_))
        ));
    }

    #[test]
    fn wire_json_round_trips() {
        let (_d, ks) = test_keystore();
        let b = build_signed(
            listing(Priority::Perishable, "mutual-aid", &["food", "perishable"]),
            &ks,
            Utc::now(),
            20,
            1 << 20,
        )
        .unwrap();
        let json = serde_json::to_string(&b).unwrap();
        let back: Bundle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
        assert_eq!(back.computed_id().unwrap(), b.bundle_id);
    }

    #[test]
    fn canonical_keys_are_lexicographic() {
        let (_d, ks) = test_keystore();
        let b = build_signed(
            listing(Priority::Normal, "mutual-aid", &[]),
            &ks,
            Utc::now(),
            20,
            1 << 20,
        )
        .unwrap();
        let canonical = String::from_utf8(b.canonical_bytes().unwrap()).unwrap();
        let keys: Vec<&str> = canonical
            .match_indices('"')
            .collect::<Vec<_>>()
            .chunks(2)
            .filter_map(|pair| match pair {
                [(a, _), (b, _)] => Some(&canonical[a + 1..*b]),
                _ => None,
            })
            .collect();
        let top_level: Vec<&str> = vec![
            "audience",
            "authorPublicKey",
            "createdAt",
            "expiresAt",
            "hopLimit",
            "payload",
            "payloadType",
            "priority",
            "receiptPolicy",
            "tags",
            "topic",
        ];
        for key in &top_level {
            assert!(keys.contains(key), "missing {key}");
        }
        let mut sorted = top_level.clone();
        sorted.sort_unstable();
        assert_eq!(top_level, sorted);
    }
}
