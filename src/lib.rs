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
#![warn(missing_docs)]

//! Driftmesh - delay-tolerant bundle engine for community mesh networks.
//!
//! This crate provides:
//! - Signed, content-addressed envelopes ("bundles") with a canonical encoding
//! - A durable six-queue store (sled) with priority, expiry, and topic indexes
//! - TTL reaping and byte-budgeted cache eviction
//! - A pure audience/trust forwarding policy
//! - An intake pipeline that quarantines anything failing authentication
//! - A stateless pairwise peer sync protocol (index, request, push, pull)

/// Engine core (types, codec, bundle model, store, policy, intake, reaper).
pub mod core;
/// Observability (Prometheus metrics, structured logging helpers).
pub mod monitoring;
/// Peer sync protocol (wire types, axum server, reqwest client).
pub mod networking;
