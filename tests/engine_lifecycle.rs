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

mod common;

use chrono::{Duration, Utc};
use common::{listing, local_peer, test_engine};
use driftmesh::core::engine::EngineError;
use driftmesh::core::types::{Audience, BundleId, Priority, Queue};

#[test]
fn created_bundle_lands_in_outbox_signed_and_addressed() {
    let (_dir, engine) = test_engine(64 * 1024 * 1024);
    let id = engine
        .create_bundle(listing(Priority::Normal, Audience::Public, b"hello"))
        .unwrap();

    let bundle = engine.get_bundle(&id).unwrap();
    assert_eq!(bundle.bundle_id, id);
    assert_eq!(bundle.computed_id().unwrap(), id);
    assert_eq!(bundle.hop_count, 0);
    assert_eq!(bundle.hop_limit, 20);
    assert!(id.to_string().starts_with("b:sha256:"));

    let outbox = engine.list_queue(Queue::Outbox, 10, 0).unwrap();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].bundle_id, id);
}

#[test]
fn emergency_fast_path() {
    let (_dir, engine) = test_engine(64 * 1024 * 1024);

    // Pre-existing lower-priority backlog.
    for i in 0..5u8 {
        engine
            .create_bundle(listing(Priority::Normal, Audience::Public, &[i]))
            .unwrap();
        engine
            .create_bundle(listing(Priority::Low, Audience::Public, &[i, i]))
            .unwrap();
    }

    let mut input = listing(Priority::Emergency, Audience::Public, b"gas leak");
    input.topic = "coordination".into();
    let id = engine.create_bundle(input).unwrap();

    let bundle = engine.get_bundle(&id).unwrap();
    assert_eq!(bundle.expires_at - bundle.created_at, Duration::hours(12));

    // First in forwarding order despite the backlog.
    let snapshot = engine.forwarding_snapshot(None, 100).unwrap();
    assert_eq!(snapshot[0].1.bundle_id, id);

    // And first out of a pull.
    let offered = engine.serve_pull(1, &local_peer(), Utc::now()).unwrap();
    assert_eq!(offered[0].bundle_id, id);
}

#[test]
fn staging_and_delivery_transitions() {
    let (_dir, engine) = test_engine(64 * 1024 * 1024);
    let id = engine
        .create_bundle(listing(Priority::Normal, Audience::Public, b"move me"))
        .unwrap();

    engine.to_pending(&id).unwrap();
    assert_eq!(engine.list_queue(Queue::Pending, 10, 0).unwrap().len(), 1);
    assert!(engine.list_queue(Queue::Outbox, 10, 0).unwrap().is_empty());

    // Not in outbox anymore: staging again is illegal.
    assert!(matches!(
        engine.to_pending(&id),
        Err(EngineError::IllegalTransition)
    ));
    // Not in inbox: delivery of a pending bundle is illegal.
    assert!(matches!(
        engine.mark_delivered(&id),
        Err(EngineError::IllegalTransition)
    ));

    let ghost: BundleId = format!("b:sha256:{}", "00".repeat(32)).parse().unwrap();
    assert!(matches!(engine.to_pending(&ghost), Err(EngineError::NotFound)));
    assert!(matches!(engine.get_bundle(&ghost), Err(EngineError::NotFound)));
}

#[test]
fn stats_reflect_queue_population() {
    let (_dir, engine) = test_engine(64 * 1024 * 1024);
    for i in 0..3u8 {
        engine
            .create_bundle(listing(Priority::Normal, Audience::Public, &[i]))
            .unwrap();
    }
    let id = engine
        .create_bundle(listing(Priority::Low, Audience::Public, b"staged"))
        .unwrap();
    engine.to_pending(&id).unwrap();

    let stats = engine.stats().unwrap();
    assert_eq!(stats.queues.outbox, 3);
    assert_eq!(stats.queues.pending, 1);
    assert_eq!(stats.queues.inbox, 0);
    assert_eq!(stats.created, 4);
    assert!(stats.cache_used_bytes > 0);
    assert_eq!(stats.cache_budget_bytes, 64 * 1024 * 1024);
}

#[test]
fn node_info_exposes_armored_identity() {
    let (_dir, engine) = test_engine(64 * 1024 * 1024);
    let info = engine.node_info();
    assert!(info.node_public_key.starts_with("ed25519:"));
    assert_eq!(info.fingerprint.len(), 16);
}

#[test]
fn list_queue_paginates_in_order() {
    let (_dir, engine) = test_engine(64 * 1024 * 1024);
    engine
        .create_bundle(listing(Priority::Low, Audience::Public, b"a"))
        .unwrap();
    engine
        .create_bundle(listing(Priority::Emergency, Audience::Public, b"b"))
        .unwrap();
    engine
        .create_bundle(listing(Priority::Normal, Audience::Public, b"c"))
        .unwrap();

    let page1 = engine.list_queue(Queue::Outbox, 2, 0).unwrap();
    let page2 = engine.list_queue(Queue::Outbox, 2, 2).unwrap();
    assert_eq!(page1.len(), 2);
    assert_eq!(page2.len(), 1);
    assert_eq!(page1[0].priority, Priority::Emergency);
    assert_eq!(page1[1].priority, Priority::Normal);
    assert_eq!(page2[0].priority, Priority::Low);
}
