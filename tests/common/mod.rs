//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - Mock TreeCache recording calls, with failure injection
//! - Recording LocalSessionManager
//! - Delegate and record helpers

#![allow(dead_code)]

pub mod mock_cache;

pub use mock_cache::*;

use serde_json::json;
use session_replication::codec::{MetadataFields, ProtocolMetadata, SessionMetadata, SessionRecord};
use session_replication::config::DelegateConfig;
use session_replication::delegate::ReplicationDelegate;
use session_replication::keys::{EntityKey, SessionKey};
use std::sync::Arc;

/// Config for application "billing" deployed at context "host1".
pub fn billing_config() -> DelegateConfig {
    let mut config = DelegateConfig::for_testing("billing", "host1");
    config.local_node_id = "nodeA".to_string();
    config
}

/// Delegate over a fresh mock cache, returning both.
pub fn billing_delegate() -> (ReplicationDelegate<MockTreeCache>, Arc<MockTreeCache>) {
    let cache = Arc::new(MockTreeCache::new());
    let delegate = ReplicationDelegate::new(billing_config(), Arc::clone(&cache)).unwrap();
    (delegate, cache)
}

pub fn app_key(delegate: &ReplicationDelegate<MockTreeCache>, id: &str) -> EntityKey {
    EntityKey::application(delegate.application_key(id))
}

pub fn session_key(delegate: &ReplicationDelegate<MockTreeCache>, app_id: &str, id: &str) -> EntityKey {
    EntityKey::session(delegate.application_key(app_id), SessionKey::new(id))
}

/// Session metadata carrying `{"plan": "gold"}` as protocol metadata.
pub fn gold_plan_metadata(id: &str) -> SessionMetadata {
    let mut protocol = ProtocolMetadata::new();
    protocol.insert("plan".to_string(), json!("gold"));
    SessionMetadata::Session(MetadataFields::new(id, 1_700_000_000_000).with_protocol(protocol))
}

/// A protocol session record with dirty metadata.
pub fn gold_plan_record(id: &str) -> SessionRecord {
    SessionRecord::new(1).with_metadata(gold_plan_metadata(id))
}
