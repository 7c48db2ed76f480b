//! Fuzz target for cache path parsing.
//!
//! Arbitrary segment lists must never panic the parser, and anything it
//! accepts must rebuild to the same path.

#![no_main]

use libfuzzer_sys::fuzz_target;
use session_replication::config::PathConfig;
use session_replication::path::{CachePath, PathScheme};

fuzz_target!(|segments: Vec<String>| {
    let scheme = match PathScheme::new(&PathConfig::default(), "host1", "0123456789abcdef") {
        Ok(scheme) => scheme,
        Err(_) => return,
    };
    let path = CachePath::from_segments(segments);

    // Should never panic
    let Some(parsed) = scheme.parse(&path) else {
        return;
    };

    let rebuilt = match &parsed.session_id {
        Some(session) => scheme.session(&parsed.application_session_id, session, parsed.owner.as_deref()),
        None => scheme.application_session(&parsed.application_session_id, parsed.owner.as_deref()),
    };
    assert_eq!(rebuilt.ok(), Some(path));
});
