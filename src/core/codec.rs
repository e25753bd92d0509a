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

//! Canonical and storage codecs.
//!
//! Two encodings with distinct jobs:
//!
//! - The **canonical form** is compact JSON with keys in a fixed lexicographic
//!   order, UTF-8 strings, base64 armor for binary fields, and RFC-3339 UTC
//!   timestamps. Bundle ids and signatures are computed over it. Key order is
//!   guaranteed by declaring region struct fields in lexicographic order of
//!   their wire names; serde_json preserves declaration order.
//! - The **storage form** is canonical bincode (fixint, trailing bytes
//!   rejected, size-capped decode). It encodes full bundles for sled values
//!   and over the sync wire body, and is the unit of byte accounting.

use bincode::Options;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Hard cap on any stored or received bundle record.
pub const MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialization")]
    Serialize,
    #[error("deserialization")]
    Deserialize,
    #[error("size limit exceeded")]
    TooLarge,
}

/// Canonical JSON bytes of a value.
///
/// The caller is responsible for the value's key ordering (region structs
/// declare fields lexicographically; maps must be `BTreeMap`).
pub fn canonical_json<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(v).map_err(|_| CodecError::Serialize)
}

/// Canonical bincode options (deterministic).
fn bincode_opts() -> impl Options {
    // Fixint encoding provides a stable integer representation.
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode a record for storage or transfer.
pub fn encode_record<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    let out = bincode_opts()
        .serialize(v)
        .map_err(|_| CodecError::Serialize)?;
    if out.len() > MAX_RECORD_BYTES {
        return Err(CodecError::TooLarge);
    }
    Ok(out)
}

/// Decode a record with a hard size cap.
pub fn decode_record_limited<T: DeserializeOwned>(
    bytes: &[u8],
    max: usize,
) -> Result<T, CodecError> {
    // Fast-path cap on the raw bytes.
    if bytes.len() > max {
        return Err(CodecError::TooLarge);
    }
    // Defensive cap inside the deserializer to prevent memory bombs via
    // large container lengths.
    bincode_opts()
        .with_limit(max as u64)
        .deserialize(bytes)
        .map_err(|_| CodecError::Deserialize)
}

/// Decode a record with the default cap.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    decode_record_limited(bytes, MAX_RECORD_BYTES)
}
