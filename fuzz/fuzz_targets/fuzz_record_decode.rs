#![no_main]
use libfuzzer_sys::fuzz_target;

use driftmesh::core::bundle::Bundle;
use driftmesh::core::codec::decode_record;

fuzz_target!(|data: &[u8]| {
    // Storage records from a corrupt db must fail cleanly, never panic.
    let _ = decode_record::<Bundle>(data);
});
