// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bridges cache events to the application-session runtime.
//!
//! The cache engine reports changes by path. The listeners here map those
//! paths back to session keys through the delegate's [`PathScheme`] and
//! forward them to a [`LocalSessionManager`]:
//!
//! - [`SessionCacheListener`]: remote modifications and removals, so the
//!   runtime can drop or refresh its in-memory copy.
//! - [`PassivationListener`]: passivation, activation and eviction, only
//!   registered when passivation is enabled.
//!
//! Registration is scoped: a [`ListenerRegistration`] registers on creation
//! and deregisters when dropped.

use crate::error::{ReplicationError, Result};
use crate::keys::{ApplicationSessionKey, EntityKey, SessionKey};
use crate::metrics;
use crate::path::{CachePath, PathScheme};
use crate::tree_cache::{CacheEvent, CacheEventKind, CacheListener, ListenerId, TreeCache};
use std::sync::Arc;
use tracing::{debug, trace};

/// Callbacks into the application-session runtime.
///
/// All methods default to doing nothing, so a runtime only implements the
/// notifications it cares about.
pub trait LocalSessionManager: Send + Sync {
    /// Another node wrote new state for this session.
    fn session_changed_remotely(&self, _key: &EntityKey) {}

    /// Another node removed this session.
    fn session_removed_remotely(&self, _key: &EntityKey) {}

    /// The session's state was written to the passivation store.
    fn session_passivated(&self, _key: &EntityKey) {}

    /// The session's state was brought back into memory.
    fn session_activated(&self, _key: &EntityKey) {}

    /// The session's state was evicted from memory.
    fn session_evicted(&self, _key: &EntityKey) {}
}

/// A session manager that ignores every notification.
#[derive(Debug, Clone, Default)]
pub struct NoOpSessionManager;

impl LocalSessionManager for NoOpSessionManager {}

/// Map a path back to a key of this application, primary tree only.
fn primary_key(scheme: &PathScheme, application_name: &str, path: &CachePath) -> Option<EntityKey> {
    let parsed = scheme.parse(path)?;
    if parsed.owner.is_some() {
        return None;
    }
    let app = ApplicationSessionKey::new(parsed.application_session_id, application_name);
    Some(match parsed.session_id {
        Some(id) => EntityKey::session(app, SessionKey::new(id)),
        None => EntityKey::application(app),
    })
}

/// Forwards remote modifications and removals of this application's sessions.
///
/// Local-origin events are ignored (the runtime made the change itself), as
/// are buddy-backup paths and paths of other applications.
pub struct SessionCacheListener {
    scheme: PathScheme,
    application_name: String,
    manager: Arc<dyn LocalSessionManager>,
}

impl SessionCacheListener {
    pub fn new(
        scheme: PathScheme,
        application_name: impl Into<String>,
        manager: Arc<dyn LocalSessionManager>,
    ) -> Self {
        Self {
            scheme,
            application_name: application_name.into(),
            manager,
        }
    }
}

impl CacheListener for SessionCacheListener {
    fn on_event(&self, event: &CacheEvent) {
        if event.origin_local {
            return;
        }
        let Some(key) = primary_key(&self.scheme, &self.application_name, &event.path) else {
            return;
        };
        match event.kind {
            CacheEventKind::Modified => {
                trace!(key = %key, "Remote modification");
                metrics::record_listener_event("session_cache", "modified");
                self.manager.session_changed_remotely(&key);
            }
            CacheEventKind::Removed => {
                debug!(key = %key, "Remote removal");
                metrics::record_listener_event("session_cache", "removed");
                self.manager.session_removed_remotely(&key);
            }
            _ => {}
        }
    }
}

/// Forwards passivation lifecycle events for this application's sessions.
pub struct PassivationListener {
    scheme: PathScheme,
    application_name: String,
    manager: Arc<dyn LocalSessionManager>,
}

impl PassivationListener {
    pub fn new(
        scheme: PathScheme,
        application_name: impl Into<String>,
        manager: Arc<dyn LocalSessionManager>,
    ) -> Self {
        Self {
            scheme,
            application_name: application_name.into(),
            manager,
        }
    }
}

impl CacheListener for PassivationListener {
    fn on_event(&self, event: &CacheEvent) {
        let Some(key) = primary_key(&self.scheme, &self.application_name, &event.path) else {
            return;
        };
        match event.kind {
            CacheEventKind::Passivated => {
                metrics::record_listener_event("passivation", "passivated");
                self.manager.session_passivated(&key);
            }
            // A cache-loader load is an activation from the runtime's view
            CacheEventKind::Activated | CacheEventKind::Loaded => {
                metrics::record_listener_event("passivation", "activated");
                self.manager.session_activated(&key);
            }
            CacheEventKind::Evicted => {
                metrics::record_listener_event("passivation", "evicted");
                self.manager.session_evicted(&key);
            }
            CacheEventKind::Modified | CacheEventKind::Removed => {}
        }
    }
}

/// A listener registration that is released on drop.
pub struct ListenerRegistration<C: TreeCache> {
    cache: Arc<C>,
    id: ListenerId,
    name: &'static str,
}

impl<C: TreeCache> ListenerRegistration<C> {
    /// Register `listener` with the cache.
    pub fn register(cache: &Arc<C>, listener: Arc<dyn CacheListener>, name: &'static str) -> Result<Self> {
        let id = cache
            .add_listener(listener)
            .map_err(|e| ReplicationError::Listener(format!("{}: {}", name, e)))?;
        debug!(listener = name, listener_id = id.0, "Listener registered");
        Ok(Self {
            cache: Arc::clone(cache),
            id,
            name,
        })
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<C: TreeCache> Drop for ListenerRegistration<C> {
    fn drop(&mut self) {
        let removed = self.cache.remove_listener(self.id);
        debug!(listener = self.name, listener_id = self.id.0, removed, "Listener deregistered");
    }
}
