//! Fuzz target for session record decoding.
//!
//! Field mappings read back from a peer are untrusted. Decoding must either
//! produce a record or report it corrupt, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use session_replication::codec;
use session_replication::keys::EntityKind;
use session_replication::tree_cache::FieldMap;

fuzz_target!(|data: &[u8]| {
    let Ok(fields) = serde_json::from_slice::<FieldMap>(data) else {
        return;
    };

    for kind in [EntityKind::ApplicationSession, EntityKind::Session] {
        let _ = codec::decode(&fields, kind, true);
        let _ = codec::decode(&fields, kind, false);
    }
});
