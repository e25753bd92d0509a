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
use common::{foreign_bundle, foreign_keystore, listing, local_peer, test_engine};
use driftmesh::core::reaper;
use driftmesh::core::types::{Audience, Priority, Queue};

#[test]
fn tick_sweeps_all_live_queues() {
    let (_dir, engine) = test_engine(64 * 1024 * 1024);
    let (_kd, peer_ks) = foreign_keystore();
    let now = Utc::now();

    // One short-lived bundle in each reaped queue.
    let mut ids = Vec::new();
    for queue in [Queue::Inbox, Queue::Outbox, Queue::Pending] {
        let mut input = listing(Priority::Normal, Audience::Public, queue.as_str().as_bytes());
        input.expires_at = Some(now + Duration::seconds(5));
        let b = foreign_bundle(&peer_ks, input);
        ids.push(b.bundle_id);
        engine.store().create(&b, queue).unwrap();
    }
    // A long-lived one that must stay put.
    let keeper = foreign_bundle(
        &peer_ks,
        listing(Priority::Normal, Audience::Public, b"keeper"),
    );
    let keeper_id = keeper.bundle_id;
    engine.store().create(&keeper, Queue::Inbox).unwrap();

    // One reaper period later the short-lived ones are all in expired.
    let later = now + Duration::seconds(70);
    let report = reaper::tick(
        engine.store(),
        engine.metrics(),
        Duration::days(7),
        later,
    )
    .unwrap();
    assert_eq!(report.moved_expired, 3);
    assert_eq!(report.purged, 0);

    for id in &ids {
        assert!(engine.store().exists_in(id, &[Queue::Expired]).unwrap());
        assert!(!engine
            .store()
            .exists_in(id, &[Queue::Inbox, Queue::Outbox, Queue::Pending])
            .unwrap());
    }
    assert!(engine.store().exists_in(&keeper_id, &[Queue::Inbox]).unwrap());
}

#[test]
fn retention_purges_old_expired_bundles() {
    let (_dir, engine) = test_engine(64 * 1024 * 1024);
    let (_kd, peer_ks) = foreign_keystore();
    let now = Utc::now();

    let mut input = listing(Priority::Normal, Audience::Public, b"short life");
    input.expires_at = Some(now + Duration::seconds(5));
    let b = foreign_bundle(&peer_ks, input);
    let id = b.bundle_id;
    engine.store().create(&b, Queue::Inbox).unwrap();

    let retention = Duration::days(7);

    // First tick: moved, not purged.
    reaper::tick(engine.store(), engine.metrics(), retention, now + Duration::seconds(70)).unwrap();
    assert!(engine.store().exists_in(&id, &[Queue::Expired]).unwrap());

    // Within retention: still held.
    let report = reaper::tick(
        engine.store(),
        engine.metrics(),
        retention,
        now + Duration::days(6),
    )
    .unwrap();
    assert_eq!(report.purged, 0);

    // Past retention: gone for good.
    let report = reaper::tick(
        engine.store(),
        engine.metrics(),
        retention,
        now + Duration::days(8),
    )
    .unwrap();
    assert_eq!(report.purged, 1);
    assert!(engine.store().locations(&id).unwrap().is_empty());
}

#[test]
fn expired_bundles_never_reach_forwarding_selection() {
    let (_dir, engine) = test_engine(64 * 1024 * 1024);
    let now = Utc::now();

    let mut input = listing(Priority::Emergency, Audience::Public, b"was urgent");
    input.expires_at = Some(now + Duration::seconds(5));
    let id = engine.create_bundle(input).unwrap();
    let fresh_id = engine
        .create_bundle(listing(Priority::Normal, Audience::Public, b"still good"))
        .unwrap();

    let later = now + Duration::seconds(70);
    reaper::tick(engine.store(), engine.metrics(), Duration::days(7), later).unwrap();

    let offered = engine.serve_pull(10, &local_peer(), later).unwrap();
    let offered_ids: Vec<_> = offered.iter().map(|b| b.bundle_id).collect();
    assert!(offered_ids.contains(&fresh_id));
    assert!(!offered_ids.contains(&id));
    assert!(engine.store().exists_in(&id, &[Queue::Expired]).unwrap());
}

#[test]
fn echo_pair_converges_in_expired() {
    // The one legal double-residence collapses to a single expired copy.
    let (_dir, engine) = test_engine(64 * 1024 * 1024);
    let now = Utc::now();

    let mut input = listing(Priority::Normal, Audience::Public, b"echoing");
    input.expires_at = Some(now + Duration::seconds(5));
    let id = engine.create_bundle(input).unwrap();
    let authored = engine.get_bundle(&id).unwrap();
    engine.receive(authored).unwrap();

    reaper::tick(
        engine.store(),
        engine.metrics(),
        Duration::days(7),
        now + Duration::seconds(70),
    )
    .unwrap();

    let locations = engine.store().locations(&id).unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].0, Queue::Expired);
}
