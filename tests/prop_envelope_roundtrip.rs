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

use chrono::Utc;
use driftmesh::core::bundle::{build_signed, Bundle, NewBundle};
use driftmesh::core::codec::{decode_record, encode_record};
use driftmesh::core::security::keystore::{FileEd25519Backend, Keystore};
use driftmesh::core::types::{Audience, Payload, Priority, ReceiptPolicy};
use proptest::prelude::*;

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Normal),
        Just(Priority::Perishable),
        Just(Priority::Emergency),
    ]
}

fn audience_strategy() -> impl Strategy<Value = Audience> {
    prop_oneof![
        Just(Audience::Public),
        Just(Audience::Local),
        Just(Audience::Trusted),
        Just(Audience::Private),
    ]
}

fn receipt_strategy() -> impl Strategy<Value = ReceiptPolicy> {
    prop_oneof![
        Just(ReceiptPolicy::None),
        Just(ReceiptPolicy::Requested),
        Just(ReceiptPolicy::Required),
    ]
}

fn keystore() -> (tempfile::TempDir, Keystore<FileEd25519Backend>) {
    let dir = tempfile::tempdir().unwrap();
    let ks = Keystore::open(&dir.path().join("node.key")).unwrap();
    (dir, ks)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_envelope_round_trips_both_codecs(
        priority in priority_strategy(),
        audience in audience_strategy(),
        receipt_policy in receipt_strategy(),
        topic in "[a-z][a-z-]{0,15}",
        tags in prop::collection::vec("[a-z]{1,8}", 0..5),
        payload in prop::collection::vec(any::<u8>(), 0..512),
        hop_limit in 1u32..64,
    ) {
        let (_dir, ks) = keystore();
        let bundle = build_signed(
            NewBundle {
                priority,
                audience,
                topic,
                tags,
                payload_type: "vf:Blob".into(),
                payload: Payload(payload),
                expires_at: None,
                hop_limit: Some(hop_limit),
                receipt_policy,
            },
            &ks,
            Utc::now(),
            20,
            1 << 20,
        )
        .unwrap();

        // Wire JSON round trip preserves the envelope and its identity.
        let json = serde_json::to_vec(&bundle).unwrap();
        let from_json: Bundle = serde_json::from_slice(&json).unwrap();
        prop_assert_eq!(&from_json, &bundle);
        prop_assert_eq!(from_json.computed_id().unwrap(), bundle.bundle_id);

        // Storage record round trip does too.
        let record = encode_record(&bundle).unwrap();
        let from_record: Bundle = decode_record(&record).unwrap();
        prop_assert_eq!(&from_record, &bundle);
        prop_assert_eq!(from_record.computed_id().unwrap(), bundle.bundle_id);
    }

    #[test]
    fn prop_canonical_bytes_are_stable(
        payload in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let (_dir, ks) = keystore();
        let bundle = build_signed(
            NewBundle {
                priority: Priority::Normal,
                audience: Audience::Public,
                topic: "knowledge".into(),
                tags: vec!["index".into()],
                payload_type: "vf:Blob".into(),
                payload: Payload(payload),
                expires_at: None,
                hop_limit: None,
                receipt_policy: ReceiptPolicy::None,
            },
            &ks,
            Utc::now(),
            20,
            1 << 20,
        )
        .unwrap();

        // Same value, same bytes, every time.
        let a = bundle.canonical_bytes().unwrap();
        let b = bundle.canonical_bytes().unwrap();
        prop_assert_eq!(a, b);

        // And a decode/re-encode cycle cannot drift the region.
        let json = serde_json::to_vec(&bundle).unwrap();
        let back: Bundle = serde_json::from_slice(&json).unwrap();
        prop_assert_eq!(back.canonical_bytes().unwrap(), bundle.canonical_bytes().unwrap());
    }
}
