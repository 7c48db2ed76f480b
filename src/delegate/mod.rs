// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication delegate.
//!
//! The façade the application-session runtime calls to persist and fetch
//! session state. It ties together:
//! - Path resolution via [`crate::path::PathScheme`]
//! - Record encoding via [`crate::codec`]
//! - The tree cache via [`crate::tree_cache::TreeCache`]
//! - Listener registration via [`crate::listener`]
//!
//! # Read Paths
//!
//! | Operation | Path | Region setup | Self-heal on corrupt |
//! |-----------|------|--------------|----------------------|
//! | [`load`](ReplicationDelegate::load) | primary | when `initial_load` | yes |
//! | [`load_from`](ReplicationDelegate::load_from) | primary or backup | never | never |
//!
//! A corrupt record looks exactly like a missing one to the caller. `load`
//! additionally drops the local replica so the next read refetches a good
//! copy. A cache that cannot be *reached* is a different failure: it is
//! returned as [`ReplicationError::CacheRead`] and nothing is dropped.
//!
//! # Concurrency
//!
//! The delegate holds no locks across cache calls. Ordering between
//! concurrent calls for the same key is whatever the cache engine provides.

mod types;

pub use types::DelegateState;

use crate::codec::{self, SessionRecord};
use crate::config::DelegateConfig;
use crate::directory::OwnerDirectory;
use crate::error::{ReplicationError, Result};
use crate::keys::{ApplicationSessionKey, EntityKey, EntityKind, Owner, SessionKey};
use crate::listener::{
    ListenerRegistration, LocalSessionManager, NoOpSessionManager, PassivationListener,
    SessionCacheListener,
};
use crate::metrics;
use crate::path::{CachePath, PathScheme};
use crate::tree_cache::TreeCache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

/// Replicates the sessions of one deployed application.
pub struct ReplicationDelegate<C: TreeCache> {
    config: DelegateConfig,
    scheme: PathScheme,
    cache: Arc<C>,
    manager: Arc<dyn LocalSessionManager>,
    state: DelegateState,
    /// Held while running; dropping them deregisters the listeners.
    registrations: Vec<ListenerRegistration<C>>,
}

impl<C: TreeCache> ReplicationDelegate<C> {
    /// Create a delegate that forwards no cache events.
    pub fn new(config: DelegateConfig, cache: Arc<C>) -> Result<Self> {
        Self::with_session_manager(config, cache, Arc::new(NoOpSessionManager))
    }

    /// Create a delegate whose listeners notify `manager`.
    pub fn with_session_manager(
        config: DelegateConfig,
        cache: Arc<C>,
        manager: Arc<dyn LocalSessionManager>,
    ) -> Result<Self> {
        config.validate()?;
        let scheme = config.path_scheme()?;
        Ok(Self {
            config,
            scheme,
            cache,
            manager,
            state: DelegateState::Created,
            registrations: Vec::new(),
        })
    }

    pub fn config(&self) -> &DelegateConfig {
        &self.config
    }

    pub fn scheme(&self) -> &PathScheme {
        &self.scheme
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn state(&self) -> DelegateState {
        self.state
    }

    /// Key of an application session of this delegate's application.
    pub fn application_key(&self, id: impl Into<String>) -> ApplicationSessionKey {
        ApplicationSessionKey::new(id, self.config.application_name.clone())
    }

    /// Directory view over this delegate's sessions.
    pub fn directory(&self) -> OwnerDirectory<'_, C> {
        OwnerDirectory::new(self)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Register the cache listeners.
    ///
    /// The passivation listener is only registered when passivation is
    /// enabled. If any registration fails, the ones already made are
    /// released before the error is returned.
    pub fn start(&mut self) -> Result<()> {
        if !self.state.can_start() {
            return Err(ReplicationError::InvalidState {
                expected: "Created or Stopped".to_string(),
                actual: self.state.to_string(),
            });
        }

        let mut registrations = Vec::with_capacity(2);
        registrations.push(ListenerRegistration::register(
            &self.cache,
            Arc::new(SessionCacheListener::new(
                self.scheme.clone(),
                self.config.application_name.clone(),
                Arc::clone(&self.manager),
            )),
            "session_cache",
        )?);

        if self.config.passivation_enabled {
            debug!("Passivation is enabled");
            registrations.push(ListenerRegistration::register(
                &self.cache,
                Arc::new(PassivationListener::new(
                    self.scheme.clone(),
                    self.config.application_name.clone(),
                    Arc::clone(&self.manager),
                )),
                "passivation",
            )?);
        }

        self.registrations = registrations;
        self.state = DelegateState::Running;
        metrics::set_registered_listeners(&self.config.application_name, self.registrations.len());
        metrics::set_delegate_state(&self.config.application_name, "Running");
        info!(
            application = %self.config.application_name,
            node_id = %self.config.local_node_id,
            listeners = self.registrations.len(),
            "Replication delegate running"
        );
        Ok(())
    }

    /// Release the cache listeners. Stopping a delegate that is not running
    /// does nothing.
    pub fn stop(&mut self) {
        if self.state != DelegateState::Running {
            return;
        }
        self.registrations.clear();
        self.state = DelegateState::Stopped;
        metrics::set_registered_listeners(&self.config.application_name, 0);
        metrics::set_delegate_state(&self.config.application_name, "Stopped");
        info!(application = %self.config.application_name, "Replication delegate stopped");
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Record operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Write a record at the key's primary path.
    ///
    /// Metadata is written only when `record.metadata_dirty` is set; version
    /// and timestamp are always (over)written. An attribute set replaces the
    /// stored one: per-attribute fields it no longer names are removed after
    /// the write. Failures are not retried.
    pub async fn store(&self, key: &EntityKey, record: &SessionRecord) -> Result<()> {
        let path = self.primary_path(key)?;
        let kind = key.kind();

        if let Some(metadata) = &record.metadata {
            if metadata.kind() != kind {
                return Err(ReplicationError::Encode(format!(
                    "{} metadata stored under {} key {}",
                    metadata.kind(),
                    kind,
                    key
                )));
            }
            if !record.metadata_dirty {
                metrics::record_metadata_skipped(kind_label(kind));
            }
        }

        let fields = codec::encode(record, self.config.granularity)?;
        let field_count = fields.len();
        trace!(path = %path, version = record.version, fields = field_count, "Storing session");

        let start = Instant::now();
        let stale = match record.attributes {
            Some(_) => self.stale_attribute_fields(&path, record).await?,
            None => Vec::new(),
        };
        let mut result = self.cache.write_subtree(&path, fields).await;
        if result.is_ok() && !stale.is_empty() {
            trace!(path = %path, stale = stale.len(), "Dropping removed attributes");
            result = self.cache.remove_fields(&path, stale).await;
        }
        metrics::record_store(kind_label(kind), result.is_ok(), field_count, start.elapsed());
        result.map_err(|e| ReplicationError::write(&path, e))
    }

    async fn stale_attribute_fields(&self, path: &CachePath, record: &SessionRecord) -> Result<Vec<String>> {
        let existing = self
            .cache
            .read_subtree(path, true)
            .await
            .map_err(|e| ReplicationError::cache_read(path, e))?;
        Ok(existing
            .map(|fields| codec::stale_attribute_fields(&fields, record, self.config.granularity))
            .unwrap_or_default())
    }

    /// Read the record at the key's primary path.
    ///
    /// Returns `Ok(None)` when nothing is stored. With `initial_load` the
    /// cache's region setup hook runs once the record has been decoded. A
    /// record that cannot be decoded is removed from this node only and
    /// reported as absent.
    pub async fn load(&self, key: &EntityKey, initial_load: bool) -> Result<Option<SessionRecord>> {
        let path = self.primary_path(key)?;
        let kind = kind_label(key.kind());

        let fields = match self.cache.read_subtree(&path, true).await {
            Ok(Some(fields)) => fields,
            Ok(None) => {
                trace!(path = %path, "Session no longer in cache");
                metrics::record_load(kind, "miss");
                return Ok(None);
            }
            Err(e) => {
                metrics::record_load(kind, "error");
                return Err(ReplicationError::cache_read(&path, e));
            }
        };

        let record = match codec::decode(&fields, key.kind(), true) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path, error = %e, "Problem accessing session data, dropping local copy");
                metrics::record_load(kind, "corrupt");
                self.self_heal(key, &path).await;
                return Ok(None);
            }
        };

        if initial_load {
            if let Err(e) = self.cache.setup_session_region(&path).await {
                warn!(path = %path, error = %e, "Session region setup failed");
            }
        }

        metrics::record_load(kind, "hit");
        Ok(Some(record))
    }

    /// Read the record at the primary path (`owner = None`) or at the
    /// buddy-backup path of `owner`.
    ///
    /// Read-only: never runs region setup and never removes anything, even
    /// when the stored record is unreadable.
    pub async fn load_from(
        &self,
        key: &EntityKey,
        owner: Option<&str>,
        include_attributes: bool,
    ) -> Result<Option<SessionRecord>> {
        key.validate()?;
        let path = self.scheme.for_entity(key, owner)?;
        let kind = kind_label(key.kind());

        let fields = self
            .cache
            .read_subtree(&path, false)
            .await
            .map_err(|e| ReplicationError::cache_read(&path, e))?;

        let record = match fields {
            Some(fields) => match codec::decode(&fields, key.kind(), include_attributes) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(path = %path, error = %e, "Unreadable session data");
                    None
                }
            },
            None => None,
        };

        if owner.is_some() {
            metrics::record_backup_read(kind, record.is_some());
        }
        Ok(record)
    }

    /// Drop the subtree at the primary or backup path from memory.
    ///
    /// The session stays logically alive; this only frees local resources.
    pub async fn evict(&self, key: &EntityKey, owner: Option<&str>) -> Result<()> {
        key.validate()?;
        let path = self.scheme.for_entity(key, owner)?;
        trace!(path = %path, "Evicting session from distributed store");

        self.cache
            .evict_subtree(&path)
            .await
            .map_err(|e| ReplicationError::cache_remove(&path, e))?;
        metrics::record_evict(kind_label(key.kind()));
        Ok(())
    }

    /// Remove the session cluster-wide and tear down its region.
    ///
    /// Once the subtree is gone the removal has succeeded; a failed region
    /// teardown is only logged.
    pub async fn remove(&self, key: &EntityKey) -> Result<()> {
        let path = self.primary_path(key)?;
        trace!(path = %path, "Removing session from distributed store");

        self.cache
            .remove_subtree(&path)
            .await
            .map_err(|e| ReplicationError::cache_remove(&path, e))?;
        metrics::record_remove(kind_label(key.kind()), "cluster");

        if let Err(e) = self.cache.remove_session_region(key.region_id(), &path).await {
            warn!(path = %path, region_id = key.region_id(), error = %e, "Session region teardown failed");
        }
        Ok(())
    }

    /// Remove this node's copy (primary, or the backup held for `owner`)
    /// without replicating the removal or touching the region.
    pub async fn remove_local(&self, key: &EntityKey, owner: Option<&str>) -> Result<()> {
        key.validate()?;
        let path = self.scheme.for_entity(key, owner)?;
        self.remove_path_local(key.kind(), &path).await
    }

    async fn remove_path_local(&self, kind: EntityKind, path: &CachePath) -> Result<()> {
        trace!(path = %path, "Removing session from local store only");
        self.cache
            .remove_subtree_local(path)
            .await
            .map_err(|e| ReplicationError::cache_remove(path, e))?;
        metrics::record_remove(kind_label(kind), "local");
        Ok(())
    }

    /// Best-effort drop of a corrupt local replica.
    async fn self_heal(&self, key: &EntityKey, path: &CachePath) {
        match self.remove_path_local(key.kind(), path).await {
            Ok(()) => metrics::record_self_heal(kind_label(key.kind()), true),
            Err(e) => {
                metrics::record_self_heal(kind_label(key.kind()), false);
                warn!(path = %path, error = %e, "Failed to drop corrupt session data");
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Owner enumeration
    // ═══════════════════════════════════════════════════════════════════════

    /// Every id of `kind` found in the cache, with the owner it was found
    /// under.
    ///
    /// Backup regions are walked first and the primary tree last, so an id
    /// present in both is reported as [`Owner::Local`]. The cache's internal
    /// marker is never reported. A listing that cannot be read is skipped.
    #[instrument(skip(self), fields(application = %self.config.application_name))]
    pub async fn list_owners(&self, kind: EntityKind) -> Result<HashMap<EntityKey, Owner>> {
        let start = Instant::now();
        let mut result = HashMap::new();
        let mut skipped = 0usize;

        let backup_root = self.scheme.backup_root();
        match self.cache.list_child_names(&backup_root).await {
            Ok(Some(owners)) => {
                for owner in owners {
                    if self.is_internal(&owner) {
                        continue;
                    }
                    let root = match self.scheme.application_root(Some(&owner)) {
                        Ok(root) => root,
                        Err(e) => {
                            warn!(owner = %owner, error = %e, "Skipping unusable backup owner");
                            skipped += 1;
                            continue;
                        }
                    };
                    skipped += self
                        .collect_ids(kind, &root, Owner::Backup(owner.clone()), &mut result)
                        .await;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(path = %backup_root, error = %e, "Cannot list backup owners");
                skipped += 1;
            }
        }

        let root = self.scheme.application_root(None)?;
        skipped += self.collect_ids(kind, &root, Owner::Local, &mut result).await;

        debug!(kind = %kind, entries = result.len(), skipped, "Listed session owners");
        metrics::record_directory_walk(kind_label(kind), result.len(), skipped, start.elapsed());
        Ok(result)
    }

    /// Collect the ids under one application root. Returns how many listings
    /// were skipped.
    async fn collect_ids(
        &self,
        kind: EntityKind,
        root: &CachePath,
        owner: Owner,
        result: &mut HashMap<EntityKey, Owner>,
    ) -> usize {
        let mut skipped = 0;
        let Some(app_ids) = self.child_names(root, &mut skipped).await else {
            return skipped;
        };

        for app_id in app_ids {
            let app = self.application_key(app_id.clone());
            match kind {
                EntityKind::ApplicationSession => {
                    result.insert(EntityKey::application(app), owner.clone());
                }
                EntityKind::Session => {
                    let Some(session_ids) = self.child_names(&root.child(app_id), &mut skipped).await
                    else {
                        continue;
                    };
                    for session_id in session_ids {
                        result.insert(
                            EntityKey::session(app.clone(), SessionKey::new(session_id)),
                            owner.clone(),
                        );
                    }
                }
            }
        }
        skipped
    }

    /// Child names of `path` without the internal marker.
    async fn child_names(&self, path: &CachePath, skipped: &mut usize) -> Option<Vec<String>> {
        match self.cache.list_child_names(path).await {
            Ok(Some(names)) => Some(
                names
                    .into_iter()
                    .filter(|name| !name.is_empty() && !self.is_internal(name))
                    .collect(),
            ),
            Ok(None) => None,
            Err(e) => {
                warn!(path = %path, error = %e, "Skipping unreadable child listing");
                *skipped += 1;
                None
            }
        }
    }

    fn is_internal(&self, name: &str) -> bool {
        name == self.config.paths.internal_marker
    }

    fn primary_path(&self, key: &EntityKey) -> Result<CachePath> {
        key.validate()?;
        self.scheme.for_entity(key, None)
    }
}

fn kind_label(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::ApplicationSession => "application_session",
        EntityKind::Session => "session",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MetadataFields, ProtocolMetadata, SessionMetadata};
    use crate::tree_cache::{FieldMap, InMemoryTreeCache};
    use serde_json::json;

    fn delegate() -> ReplicationDelegate<InMemoryTreeCache> {
        let mut config = DelegateConfig::for_testing("billing", "host1");
        config.application_name_hash = Some("h".into());
        ReplicationDelegate::new(config, Arc::new(InMemoryTreeCache::new())).unwrap()
    }

    fn app(d: &ReplicationDelegate<InMemoryTreeCache>, id: &str) -> EntityKey {
        EntityKey::application(d.application_key(id))
    }

    fn session(d: &ReplicationDelegate<InMemoryTreeCache>, app_id: &str, id: &str) -> EntityKey {
        EntityKey::session(d.application_key(app_id), SessionKey::new(id))
    }

    fn session_metadata(id: &str) -> SessionMetadata {
        let mut protocol = ProtocolMetadata::new();
        protocol.insert("plan".into(), json!("gold"));
        SessionMetadata::Session(MetadataFields::new(id, 1).with_protocol(protocol))
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let d = delegate();
        let key = session(&d, "A1", "S1");
        let record = SessionRecord::new(1)
            .with_metadata(session_metadata("S1"))
            .with_timestamp(99);
        d.store(&key, &record).await.unwrap();

        let loaded = d.load(&key, false).await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.timestamp, Some(99));
        assert_eq!(loaded.metadata, record.metadata);
    }

    #[tokio::test]
    async fn test_clean_metadata_keeps_previous() {
        let d = delegate();
        let key = session(&d, "A1", "S1");
        d.store(&key, &SessionRecord::new(1).with_metadata(session_metadata("S1")))
            .await
            .unwrap();

        let mut touch = SessionRecord::new(2).with_metadata(session_metadata("changed"));
        touch.metadata_dirty = false;
        d.store(&key, &touch).await.unwrap();

        let loaded = d.load(&key, false).await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.metadata.unwrap().fields().id, "S1");
    }

    #[tokio::test]
    async fn test_store_rejects_mismatched_metadata() {
        let d = delegate();
        let err = d
            .store(&app(&d, "A1"), &SessionRecord::new(1).with_metadata(session_metadata("S1")))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Encode(_)));
        assert_eq!(d.cache().node_count().await, 0);
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let d = delegate();
        assert!(d.load(&app(&d, "nope"), true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let d = delegate();
        let err = d.load(&app(&d, ""), false).await.unwrap_err();
        assert!(matches!(err, ReplicationError::InvalidKey(_)));
        let err = d.load_from(&app(&d, "A1"), Some(""), true).await.unwrap_err();
        assert!(matches!(err, ReplicationError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_corrupt_record_self_heals() {
        let d = delegate();
        let key = app(&d, "A1");
        let path = d.scheme().for_entity(&key, None).unwrap();
        let mut fields = FieldMap::new();
        fields.insert("version".into(), json!(1));
        fields.insert("metadata".into(), json!(42));
        d.cache().write_subtree(&path, fields).await.unwrap();

        assert!(d.load_from(&key, None, true).await.unwrap().is_none());
        assert_eq!(d.cache().node_count().await, 1, "load_from must not mutate");

        assert!(d.load(&key, true).await.unwrap().is_none());
        assert_eq!(d.cache().node_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_takes_children() {
        let d = delegate();
        d.store(&app(&d, "A1"), &SessionRecord::new(1)).await.unwrap();
        d.store(&session(&d, "A1", "S1"), &SessionRecord::new(1)).await.unwrap();

        d.remove(&app(&d, "A1")).await.unwrap();
        assert!(d.load(&session(&d, "A1", "S1"), false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_owners_with_backups() {
        let d = delegate();
        d.store(&app(&d, "A1"), &SessionRecord::new(1)).await.unwrap();
        let backup = d.scheme().application_session("A2", Some("nodeB")).unwrap();
        d.cache().write_subtree(&backup, FieldMap::new()).await.unwrap();
        let marker = d.scheme().application_root(None).unwrap().child("_JBOSS_INTERNAL_");
        d.cache().write_subtree(&marker, FieldMap::new()).await.unwrap();

        let owners = d.list_owners(EntityKind::ApplicationSession).await.unwrap();
        assert_eq!(owners.len(), 2);
        assert_eq!(owners.get(&app(&d, "A1")), Some(&Owner::Local));
        assert_eq!(owners.get(&app(&d, "A2")), Some(&Owner::Backup("nodeB".into())));
    }

    #[tokio::test]
    async fn test_start_stop_registers_listeners() {
        let mut config = DelegateConfig::for_testing("billing", "host1");
        config.passivation_enabled = true;
        let cache = Arc::new(InMemoryTreeCache::new());
        let mut d = ReplicationDelegate::new(config, Arc::clone(&cache)).unwrap();

        d.start().unwrap();
        assert_eq!(d.state(), DelegateState::Running);
        assert_eq!(cache.listener_count(), 2);
        assert!(d.start().is_err());

        d.stop();
        assert_eq!(d.state(), DelegateState::Stopped);
        assert_eq!(cache.listener_count(), 0);

        d.start().unwrap();
        assert_eq!(cache.listener_count(), 2);
        drop(d);
        assert_eq!(cache.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_attribute_removal_not_resurrected() {
        use crate::codec::Attributes;
        use crate::config::ReplicationGranularity;

        for granularity in [ReplicationGranularity::Attribute, ReplicationGranularity::Session] {
            let mut config = DelegateConfig::for_testing("billing", "host1");
            config.granularity = granularity;
            let d = ReplicationDelegate::new(config, Arc::new(InMemoryTreeCache::new())).unwrap();
            let key = app(&d, "A1");

            let mut attrs = Attributes::new();
            attrs.insert("caller".into(), json!("alice"));
            attrs.insert("hops".into(), json!(3));
            d.store(&key, &SessionRecord::new(1).with_attributes(attrs.clone()))
                .await
                .unwrap();

            attrs.remove("hops");
            d.store(&key, &SessionRecord::new(2).with_attributes(attrs.clone()))
                .await
                .unwrap();
            let loaded = d.load(&key, false).await.unwrap().unwrap();
            assert_eq!(loaded.attributes, Some(attrs), "{:?}", granularity);

            // A record without attributes leaves the stored set alone
            d.store(&key, &SessionRecord::new(3)).await.unwrap();
            let loaded = d.load(&key, false).await.unwrap().unwrap();
            assert_eq!(loaded.version, 3);
            assert_eq!(loaded.attributes.map(|a| a.len()), Some(1));
        }
    }

    #[test]
    fn test_listener_registrations_are_per_delegate() {
        let cache = Arc::new(InMemoryTreeCache::new());
        let mut billing =
            ReplicationDelegate::new(DelegateConfig::for_testing("billing", "host1"), Arc::clone(&cache))
                .unwrap();
        let mut routing =
            ReplicationDelegate::new(DelegateConfig::for_testing("routing", "host1"), Arc::clone(&cache))
                .unwrap();

        billing.start().unwrap();
        routing.start().unwrap();
        assert_eq!(cache.listener_count(), 2);

        billing.stop();
        assert_eq!(cache.listener_count(), 1);
        assert_eq!(routing.state(), DelegateState::Running);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = DelegateConfig::for_testing("", "host1");
        assert!(ReplicationDelegate::new(config, Arc::new(InMemoryTreeCache::new())).is_err());
    }
}
