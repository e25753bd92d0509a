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

//! Engine core.

/// Bundle model: construction, TTL defaults, canonical region.
pub mod bundle;
/// Cache budget manager and eviction.
pub mod cache;
/// Canonical and storage codecs.
pub mod codec;
/// Engine value and control API.
pub mod engine;
/// Intake pipeline for inbound bundles.
pub mod intake;
/// Forwarding policy and forwarding order.
pub mod policy;
/// TTL reaper.
pub mod reaper;
/// Identity and signing.
pub mod security;
/// Durable six-queue store.
pub mod store;
/// Core types and configuration records.
pub mod types;
