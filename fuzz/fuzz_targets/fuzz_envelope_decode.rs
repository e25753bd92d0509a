#![no_main]
use libfuzzer_sys::fuzz_target;

use driftmesh::core::bundle::Bundle;

fuzz_target!(|data: &[u8]| {
    // Adversarial wire JSON must never panic the envelope path; anything
    // that parses must also survive canonicalization and structure checks.
    if let Ok(bundle) = serde_json::from_slice::<Bundle>(data) {
        let _ = bundle.computed_id();
        let _ = bundle.check_structure(1 << 20);
    }
});
