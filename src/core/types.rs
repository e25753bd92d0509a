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

//! Core types: priorities, audiences, queues, identifiers, configuration.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix of every rendered bundle id.
pub const BUNDLE_ID_PREFIX: &str = "b:sha256:";

/// Relay priority. Totally ordered, `Emergency` highest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Bulk/background traffic.
    Low,
    /// Default.
    Normal,
    /// Time-critical goods (food, rides, pickups).
    Perishable,
    /// Safety-critical alerts.
    Emergency,
}

impl Priority {
    /// Index-key rank: 0 sorts first (most urgent).
    pub fn index_rank(self) -> u8 {
        match self {
            Priority::Emergency => 0,
            Priority::Perishable => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Emergency => "emergency",
            Priority::Perishable => "perishable",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

/// Declared scope of who may carry or receive a bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// Anyone.
    Public,
    /// Peers on the same island only.
    Local,
    /// Peers above the trust threshold only.
    Trusted,
    /// Declared recipient only. Cryptography deferred; forwarding default-denies.
    Private,
}

impl Audience {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Audience::Public => "public",
            Audience::Local => "local",
            Audience::Trusted => "trusted",
            Audience::Private => "private",
        }
    }
}

/// Delivery-receipt interest declared by the author. Informational to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptPolicy {
    /// No receipt wanted.
    None,
    /// Receipt appreciated.
    Requested,
    /// Receipt required by the application.
    Required,
}

/// The six named queues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Queue {
    /// Valid bundles received from peers.
    Inbox,
    /// Bundles authored locally, awaiting a forwarding opportunity.
    Outbox,
    /// Bundles selected for forwarding.
    Pending,
    /// Bundles whose payload reached its recipient.
    Delivered,
    /// Bundles past their expiry, held for the retention window.
    Expired,
    /// Bundles that failed authenticity or structural validation. Terminal.
    Quarantine,
}

impl Queue {
    /// All queues, in tag order.
    pub const ALL: [Queue; 6] = [
        Queue::Inbox,
        Queue::Outbox,
        Queue::Pending,
        Queue::Delivered,
        Queue::Expired,
        Queue::Quarantine,
    ];

    /// Queues swept by the TTL reaper.
    pub const REAPED: [Queue; 3] = [Queue::Inbox, Queue::Outbox, Queue::Pending];

    /// One-byte tag used in store keys.
    pub fn tag(self) -> u8 {
        match self {
            Queue::Inbox => 0,
            Queue::Outbox => 1,
            Queue::Pending => 2,
            Queue::Delivered => 3,
            Queue::Expired => 4,
            Queue::Quarantine => 5,
        }
    }

    /// Inverse of [`Queue::tag`].
    pub fn from_tag(tag: u8) -> Option<Queue> {
        Queue::ALL.into_iter().find(|q| q.tag() == tag)
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Queue::Inbox => "inbox",
            Queue::Outbox => "outbox",
            Queue::Pending => "pending",
            Queue::Delivered => "delivered",
            Queue::Expired => "expired",
            Queue::Quarantine => "quarantine",
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Queue {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Queue::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or(TypeError::UnknownQueue)
    }
}

/// Type parsing/encoding errors.
#[derive(Debug, Error)]
pub enum TypeError {
    #[error("unknown queue")]
    UnknownQueue,
    #[error("invalid bundle id")]
    InvalidBundleId,
    #[error("invalid key encoding")]
    InvalidKey,
    #[error("invalid signature encoding")]
    InvalidSignature,
}

/// Content-address of a bundle: SHA-256 of the canonical region.
///
/// Rendered as `b:sha256:<64 lowercase hex chars>`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BundleId([u8; 32]);

impl BundleId {
    /// Wrap a raw digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", BUNDLE_ID_PREFIX, hex::encode(self.0))
    }
}

impl fmt::Debug for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BundleId({self})")
    }
}

impl FromStr for BundleId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s
            .strip_prefix(BUNDLE_ID_PREFIX)
            .ok_or(TypeError::InvalidBundleId)?;
        if hex_part.len() != 64 || hex_part.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(TypeError::InvalidBundleId);
        }
        let raw = hex::decode(hex_part).map_err(|_| TypeError::InvalidBundleId)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&raw);
        Ok(Self(out))
    }
}

impl Serialize for BundleId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BundleId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Ed25519 public key bytes, text-armored as base64 on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Text-armored export, `ed25519:<base64>`.
    pub fn armored(&self) -> String {
        format!("ed25519:{}", B64.encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0[..6]))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&B64.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        let raw = B64.decode(s.as_bytes()).map_err(de::Error::custom)?;
        let arr: [u8; 32] = raw
            .try_into()
            .map_err(|_| de::Error::custom(TypeError::InvalidKey))?;
        Ok(Self(arr))
    }
}

/// Detached Ed25519 signature (64 bytes), text-armored as base64 on the wire.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature(pub Vec<u8>);

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({} bytes)", self.0.len())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&B64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        let raw = B64.decode(s.as_bytes()).map_err(de::Error::custom)?;
        Ok(Self(raw))
    }
}

/// Opaque application payload, base64-armored on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Payload(pub Vec<u8>);

impl Payload {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({} bytes)", self.0.len())
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&B64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        let raw = B64.decode(s.as_bytes()).map_err(de::Error::custom)?;
        Ok(Self(raw))
    }
}

/// Node configuration root (TOML).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node settings.
    pub node: NodeSettings,
    /// HTTP endpoints (sync listener).
    pub http: HttpConfig,
    /// Engine settings.
    pub engine: EngineConfig,
}

/// Node settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Human-readable name.
    pub name: String,
    /// Data directory (db + keys).
    pub data_dir: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: "driftmesh".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

/// HTTP config.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address, e.g. 0.0.0.0:7450.
    pub listen_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7450".to_string(),
        }
    }
}

/// Engine settings (the recognized configuration set).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Total bytes allowed across all queues (default 2 GiB).
    pub cache_bytes_budget: u64,
    /// Period between reaper ticks in seconds (default 60).
    pub ttl_reaper_period_secs: u64,
    /// How long expired bundles are kept before deletion, seconds (default 7 d).
    pub expired_retention_secs: u64,
    /// Hop limit for bundles created without one (default 20).
    pub default_hop_limit: u32,
    /// Minimum peer trust_score for the `trusted` audience (default 0.7).
    pub trust_threshold: f64,
    /// Where the node's Ed25519 material lives. Defaults to `<data_dir>/node.key`.
    pub key_path: Option<String>,
    /// Maximum accepted payload size in bytes (default 1 MiB).
    pub max_payload_bytes: usize,
    /// Deadline for peer index RPCs, seconds (default 30).
    pub index_deadline_secs: u64,
    /// Deadline for peer fetch/push/pull RPCs, seconds (default 120).
    pub transfer_deadline_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_bytes_budget: 2 * 1024 * 1024 * 1024,
            ttl_reaper_period_secs: 60,
            expired_retention_secs: 7 * 24 * 3600,
            default_hop_limit: 20,
            trust_threshold: 0.7,
            key_path: None,
            max_payload_bytes: 1024 * 1024,
            index_deadline_secs: 30,
            transfer_deadline_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_id_round_trips_through_display() {
        let id = BundleId::from_digest([0xab; 32]);
        let s = id.to_string();
        assert!(s.starts_with("b:sha256:"));
        assert_eq!(s.len(), BUNDLE_ID_PREFIX.len() + 64);
        assert_eq!(s.parse::<BundleId>().unwrap(), id);
    }

    #[test]
    fn bundle_id_rejects_bad_forms() {
        assert!("b:sha256:zz".parse::<BundleId>().is_err());
        assert!("sha256:00".parse::<BundleId>().is_err());
        let upper = format!("b:sha256:{}", "AB".repeat(32));
        assert!(upper.parse::<BundleId>().is_err());
    }

    #[test]
    fn priority_order_has_emergency_highest() {
        assert!(Priority::Emergency > Priority::Perishable);
        assert!(Priority::Perishable > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::Emergency.index_rank(), 0);
        assert_eq!(Priority::Low.index_rank(), 3);
    }

    #[test]
    fn queue_tags_round_trip() {
        for q in Queue::ALL {
            assert_eq!(Queue::from_tag(q.tag()), Some(q));
            assert_eq!(q.as_str().parse::<Queue>().unwrap(), q);
        }
    }

    #[test]
    fn engine_config_defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.cache_bytes_budget, 2 * 1024 * 1024 * 1024);
        assert_eq!(cfg.ttl_reaper_period_secs, 60);
        assert_eq!(cfg.expired_retention_secs, 604_800);
        assert_eq!(cfg.default_hop_limit, 20);
        assert!((cfg.trust_threshold - 0.7).abs() < f64::EPSILON);
    }
}
