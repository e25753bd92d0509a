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
use common::{foreign_bundle, foreign_keystore, listing, test_engine};
use driftmesh::core::engine::EngineError;
use driftmesh::core::intake::Disposition;
use driftmesh::core::types::{Audience, Payload, Priority, Queue};

const KIB: usize = 1024;

fn spaced() {
    // Distinct created-at milliseconds keep age ordering deterministic.
    std::thread::sleep(std::time::Duration::from_millis(5));
}

/// The spec's over-budget admission story: a full cache with an expired
/// block, low-priority foreign bundles, and a self-authored normal bundle
/// accepts a new perishable arrival by clearing expired first, then the
/// oldest low bundle; the authored bundle survives.
#[test]
fn over_budget_admission_evicts_in_order() {
    let (_dir, engine) = test_engine(64 * KIB as u64);
    let (_kd, peer_ks) = foreign_keystore();

    // Self-authored normal data, protected in outbox (~10 KiB).
    let mut mine = listing(Priority::Normal, Audience::Public, &[]);
    mine.payload = Payload(vec![1u8; 10 * KIB]);
    let mine_id = engine.create_bundle(mine).unwrap();

    // A foreign bundle already past its TTL, parked in expired (~6 KiB).
    let mut dead_input = listing(Priority::Normal, Audience::Public, &[]);
    dead_input.payload = Payload(vec![2u8; 6 * KIB]);
    dead_input.expires_at = Some(Utc::now() + Duration::seconds(2));
    let dead = foreign_bundle(&peer_ks, dead_input);
    let dead_id = dead.bundle_id;
    engine.store().create(&dead, Queue::Expired).unwrap();

    // Two low-priority foreign bundles in inbox (~16 KiB each).
    let mut low_ids = Vec::new();
    for fill in [3u8, 4u8] {
        spaced();
        let mut input = listing(Priority::Low, Audience::Public, &[]);
        input.payload = Payload(vec![fill; 16 * KIB]);
        let b = foreign_bundle(&peer_ks, input);
        low_ids.push(b.bundle_id);
        engine.store().create(&b, Queue::Inbox).unwrap();
    }

    // Usage ~48 KiB of a 64 KiB budget; a 24 KiB perishable arrival pushes
    // past the 95% watermark and must evict expired first, then one low.
    spaced();
    let mut incoming = listing(Priority::Perishable, Audience::Public, &[]);
    incoming.tags = vec!["food".into()];
    incoming.payload = Payload(vec![9u8; 24 * KIB]);
    let arriving = foreign_bundle(&peer_ks, incoming);
    let arriving_id = arriving.bundle_id;

    assert_eq!(engine.receive(arriving).unwrap(), Disposition::Stored);

    // Expired went first.
    assert!(engine.store().locations(&dead_id).unwrap().is_empty());
    // The older low bundle followed; the newer one survives.
    assert!(engine.store().locations(&low_ids[0]).unwrap().is_empty());
    assert!(engine.store().exists_in(&low_ids[1], &[Queue::Inbox]).unwrap());
    // The authored bundle is untouchable.
    assert!(engine.store().exists_in(&mine_id, &[Queue::Outbox]).unwrap());
    // And the newcomer is in.
    assert!(engine
        .store()
        .exists_in(&arriving_id, &[Queue::Inbox])
        .unwrap());
}

#[test]
fn create_fails_over_budget_when_only_protected_bytes_remain() {
    let (_dir, engine) = test_engine(8 * KIB as u64);

    let mut first = listing(Priority::Normal, Audience::Public, &[]);
    first.payload = Payload(vec![1u8; 6 * KIB]);
    engine.create_bundle(first).unwrap();

    // Outbox is never evicted, so the second authored bundle cannot fit.
    let mut second = listing(Priority::Normal, Audience::Public, &[]);
    second.payload = Payload(vec![2u8; 6 * KIB]);
    assert!(matches!(
        engine.create_bundle(second),
        Err(EngineError::OverBudget)
    ));
}

#[test]
fn quarantine_evicted_before_live_traffic() {
    let (_dir, engine) = test_engine(64 * KIB as u64);
    let (_kd, peer_ks) = foreign_keystore();

    // A tampered arrival fills quarantine.
    let mut junk_input = listing(Priority::Normal, Audience::Public, &[]);
    junk_input.payload = Payload(vec![7u8; 24 * KIB]);
    let mut junk = foreign_bundle(&peer_ks, junk_input);
    junk.payload.0[0] ^= 1;
    let junk_id = junk.bundle_id;
    assert!(matches!(
        engine.receive(junk).unwrap(),
        Disposition::Quarantined(_)
    ));

    // Honest normal traffic in inbox.
    spaced();
    let mut honest_input = listing(Priority::Normal, Audience::Public, &[]);
    honest_input.payload = Payload(vec![8u8; 24 * KIB]);
    let honest = foreign_bundle(&peer_ks, honest_input);
    let honest_id = honest.bundle_id;
    assert_eq!(engine.receive(honest).unwrap(), Disposition::Stored);

    // A newcomer that forces eviction: quarantine must pay first.
    spaced();
    let mut incoming_input = listing(Priority::Normal, Audience::Public, &[]);
    incoming_input.payload = Payload(vec![9u8; 24 * KIB]);
    let incoming = foreign_bundle(&peer_ks, incoming_input);
    assert_eq!(engine.receive(incoming).unwrap(), Disposition::Stored);

    assert!(engine.store().locations(&junk_id).unwrap().is_empty());
    assert!(engine.store().exists_in(&honest_id, &[Queue::Inbox]).unwrap());
}

#[test]
fn eviction_is_observable_in_stats() {
    let (_dir, engine) = test_engine(48 * KIB as u64);
    let (_kd, peer_ks) = foreign_keystore();

    for fill in 0..3u8 {
        spaced();
        let mut input = listing(Priority::Low, Audience::Public, &[]);
        input.payload = Payload(vec![fill; 20 * KIB]);
        let b = foreign_bundle(&peer_ks, input);
        engine.receive(b).unwrap();
    }

    let stats = engine.stats().unwrap();
    assert!(stats.evicted > 0, "third arrival must have evicted");
    assert!(stats.cache_used_bytes <= stats.cache_budget_bytes);
}
