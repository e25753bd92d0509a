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
#![allow(dead_code)]

use driftmesh::core::bundle::{build_signed, Bundle, NewBundle};
use driftmesh::core::engine::Engine;
use driftmesh::core::policy::PeerDescriptor;
use driftmesh::core::security::keystore::{FileEd25519Backend, Keystore};
use driftmesh::core::types::{
    Audience, NodeConfig, Payload, Priority, ReceiptPolicy,
};
use chrono::Utc;

/// Engine on a fresh temp dir; the dir guard must outlive the engine.
pub fn test_engine(budget_bytes: u64) -> (tempfile::TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = NodeConfig::default();
    cfg.node.data_dir = dir.path().to_str().unwrap().to_string();
    cfg.engine.cache_bytes_budget = budget_bytes;
    let engine = Engine::open(&cfg).unwrap();
    (dir, engine)
}

/// A foreign signer representing some other mesh node.
pub fn foreign_keystore() -> (tempfile::TempDir, Keystore<FileEd25519Backend>) {
    let dir = tempfile::tempdir().unwrap();
    let ks = Keystore::open(&dir.path().join("node.key")).unwrap();
    (dir, ks)
}

/// Inputs for a plain public mutual-aid listing.
pub fn listing(priority: Priority, audience: Audience, body: &[u8]) -> NewBundle {
    NewBundle {
        priority,
        audience,
        topic: "mutual-aid".into(),
        tags: vec![],
        payload_type: "vf:Listing".into(),
        payload: Payload(body.to_vec()),
        expires_at: None,
        hop_limit: None,
        receipt_policy: ReceiptPolicy::None,
    }
}

/// Sign a bundle with a foreign key, as a peer would.
pub fn foreign_bundle(
    ks: &Keystore<FileEd25519Backend>,
    new: NewBundle,
) -> Bundle {
    build_signed(new, ks, Utc::now(), 20, 1 << 20).unwrap()
}

/// A nearby, fully trusted peer.
pub fn local_peer() -> PeerDescriptor {
    PeerDescriptor {
        is_local: true,
        trust_score: 1.0,
        node_id: None,
    }
}

/// A distant peer with the given trust score.
pub fn remote_peer(trust_score: f64) -> PeerDescriptor {
    PeerDescriptor {
        is_local: false,
        trust_score,
        node_id: None,
    }
}
