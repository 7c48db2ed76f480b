// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tree cache integration traits.
//!
//! Defines what this layer needs from the distributed, tree-structured cache
//! that holds replicated session state. The cache engine itself (transport,
//! consistency, buddy election) lives elsewhere; it is consumed through
//! [`TreeCache`].
//!
//! # Example
//!
//! ```rust,no_run
//! use session_replication::path::CachePath;
//! use session_replication::tree_cache::{
//!     BoxFuture, CacheListener, CacheResult, FieldMap, ListenerId, TreeCache,
//! };
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//!
//! struct MyCache { /* ... */ }
//!
//! impl TreeCache for MyCache {
//!     fn read_subtree(&self, _path: &CachePath, _all: bool) -> BoxFuture<'_, Option<FieldMap>> {
//!         Box::pin(async move { Ok(None) })
//!     }
//!
//!     fn write_subtree(&self, _path: &CachePath, _fields: FieldMap) -> BoxFuture<'_, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn remove_fields(&self, _path: &CachePath, _fields: Vec<String>) -> BoxFuture<'_, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn remove_subtree(&self, _path: &CachePath) -> BoxFuture<'_, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn remove_subtree_local(&self, _path: &CachePath) -> BoxFuture<'_, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn list_child_names(&self, _path: &CachePath) -> BoxFuture<'_, Option<BTreeSet<String>>> {
//!         Box::pin(async move { Ok(None) })
//!     }
//!
//!     fn add_listener(&self, _listener: Arc<dyn CacheListener>) -> CacheResult<ListenerId> {
//!         Ok(ListenerId(1))
//!     }
//!
//!     fn remove_listener(&self, _id: ListenerId) -> bool {
//!         true
//!     }
//! }
//! ```

use crate::path::CachePath;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// The fields stored at one cache node.
pub type FieldMap = BTreeMap<String, serde_json::Value>;

/// Result type for tree cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = CacheResult<T>> + Send + 'a>>;

/// Opaque failure reported by the cache engine.
#[derive(Debug, Clone)]
pub struct CacheError(pub String);

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CacheError {}

/// Handle returned by [`TreeCache::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Kind of change the cache engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
    /// Fields at a node were written.
    Modified,
    /// A node was removed.
    Removed,
    /// A node was loaded from a cache loader.
    Loaded,
    /// A node was evicted from memory.
    Evicted,
    /// A node was written to the passivation store.
    Passivated,
    /// A node was brought back from the passivation store.
    Activated,
}

/// A notification from the cache engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub kind: CacheEventKind,
    pub path: CachePath,
    /// `true` when the change was made by this node.
    pub origin_local: bool,
}

impl CacheEvent {
    pub fn local(kind: CacheEventKind, path: CachePath) -> Self {
        Self {
            kind,
            path,
            origin_local: true,
        }
    }

    pub fn remote(kind: CacheEventKind, path: CachePath) -> Self {
        Self {
            kind,
            path,
            origin_local: false,
        }
    }
}

/// Receives cache notifications.
///
/// Called synchronously from whichever task the cache engine dispatches on,
/// so implementations must tolerate concurrent delegate calls for the same
/// session.
pub trait CacheListener: Send + Sync {
    fn on_event(&self, event: &CacheEvent);
}

/// Trait defining what we need from the tree cache.
///
/// All operations address a subtree by [`CachePath`]. Writes merge the given
/// fields into the node; removal and eviction take the whole subtree.
pub trait TreeCache: Send + Sync + 'static {
    /// Read the fields stored at a node.
    ///
    /// Returns `None` when the node does not exist. With
    /// `include_all_fields = false` the engine may skip fetching state it
    /// does not have locally.
    fn read_subtree(&self, path: &CachePath, include_all_fields: bool) -> BoxFuture<'_, Option<FieldMap>>;

    /// Upsert fields at a node, creating it (and its ancestors) if needed.
    fn write_subtree(&self, path: &CachePath, fields: FieldMap) -> BoxFuture<'_, ()>;

    /// Remove named fields from a node cluster-wide. Missing fields and a
    /// missing node are not errors.
    fn remove_fields(&self, path: &CachePath, fields: Vec<String>) -> BoxFuture<'_, ()>;

    /// Remove a subtree cluster-wide.
    fn remove_subtree(&self, path: &CachePath) -> BoxFuture<'_, ()>;

    /// Remove a subtree from this node only, without replicating the removal.
    fn remove_subtree_local(&self, path: &CachePath) -> BoxFuture<'_, ()>;

    /// Drop a subtree from memory while it stays logically alive.
    ///
    /// Default: local removal, for engines without a separate eviction path.
    fn evict_subtree(&self, path: &CachePath) -> BoxFuture<'_, ()> {
        self.remove_subtree_local(path)
    }

    /// Names of the direct children of a node, `None` if it does not exist.
    fn list_child_names(&self, path: &CachePath) -> BoxFuture<'_, Option<BTreeSet<String>>>;

    /// Prepare per-session region bookkeeping on first local access.
    fn setup_session_region(&self, _path: &CachePath) -> BoxFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    /// Tear down per-session region bookkeeping after a session is removed.
    fn remove_session_region(&self, _region_id: &str, _path: &CachePath) -> BoxFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    /// Register a listener for cache events.
    fn add_listener(&self, listener: Arc<dyn CacheListener>) -> CacheResult<ListenerId>;

    /// Deregister a listener. Returns `false` if it was not registered.
    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// A single-node tree cache held in memory.
///
/// Useful for standalone mode and tests: there are no peers, so local and
/// cluster-wide removal behave the same. Every mutation is reported to the
/// registered listeners as a local event; [`notify`](Self::notify) injects
/// events as if they came from the engine.
#[derive(Default)]
pub struct InMemoryTreeCache {
    nodes: RwLock<BTreeMap<CachePath, FieldMap>>,
    listeners: DashMap<u64, Arc<dyn CacheListener>>,
    next_listener_id: AtomicU64,
}

impl InMemoryTreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes holding fields.
    pub async fn node_count(&self) -> usize {
        self.nodes.read().await.len()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Dispatch an event to every registered listener.
    pub fn notify(&self, event: &CacheEvent) {
        let listeners: Vec<Arc<dyn CacheListener>> =
            self.listeners.iter().map(|l| Arc::clone(l.value())).collect();
        for listener in listeners {
            listener.on_event(event);
        }
    }

    async fn remove_prefix(&self, path: &CachePath) -> usize {
        let mut nodes = self.nodes.write().await;
        let before = nodes.len();
        nodes.retain(|node, _| !node.starts_with(path));
        before - nodes.len()
    }
}

impl TreeCache for InMemoryTreeCache {
    fn read_subtree(&self, path: &CachePath, _include_all_fields: bool) -> BoxFuture<'_, Option<FieldMap>> {
        let path = path.clone();
        Box::pin(async move {
            let nodes = self.nodes.read().await;
            Ok(nodes.get(&path).cloned())
        })
    }

    fn write_subtree(&self, path: &CachePath, fields: FieldMap) -> BoxFuture<'_, ()> {
        let path = path.clone();
        Box::pin(async move {
            {
                let mut nodes = self.nodes.write().await;
                nodes.entry(path.clone()).or_default().extend(fields);
            }
            trace!(path = %path, "InMemory: wrote node");
            self.notify(&CacheEvent::local(CacheEventKind::Modified, path));
            Ok(())
        })
    }

    fn remove_fields(&self, path: &CachePath, fields: Vec<String>) -> BoxFuture<'_, ()> {
        let path = path.clone();
        Box::pin(async move {
            let removed = {
                let mut nodes = self.nodes.write().await;
                match nodes.get_mut(&path) {
                    Some(node) => fields.iter().filter(|f| node.remove(*f).is_some()).count(),
                    None => 0,
                }
            };
            trace!(path = %path, removed, "InMemory: removed fields");
            if removed > 0 {
                self.notify(&CacheEvent::local(CacheEventKind::Modified, path));
            }
            Ok(())
        })
    }

    fn remove_subtree(&self, path: &CachePath) -> BoxFuture<'_, ()> {
        let path = path.clone();
        Box::pin(async move {
            let removed = self.remove_prefix(&path).await;
            trace!(path = %path, removed, "InMemory: removed subtree");
            self.notify(&CacheEvent::local(CacheEventKind::Removed, path));
            Ok(())
        })
    }

    fn remove_subtree_local(&self, path: &CachePath) -> BoxFuture<'_, ()> {
        self.remove_subtree(path)
    }

    fn evict_subtree(&self, path: &CachePath) -> BoxFuture<'_, ()> {
        let path = path.clone();
        Box::pin(async move {
            let removed = self.remove_prefix(&path).await;
            trace!(path = %path, removed, "InMemory: evicted subtree");
            self.notify(&CacheEvent::local(CacheEventKind::Evicted, path));
            Ok(())
        })
    }

    fn list_child_names(&self, path: &CachePath) -> BoxFuture<'_, Option<BTreeSet<String>>> {
        let path = path.clone();
        Box::pin(async move {
            let nodes = self.nodes.read().await;
            let depth = path.len();
            let mut exists = false;
            let mut children = BTreeSet::new();
            for node in nodes.keys().filter(|n| n.starts_with(&path)) {
                exists = true;
                if let Some(name) = node.segments().get(depth) {
                    children.insert(name.clone());
                }
            }
            Ok(exists.then_some(children))
        })
    }

    fn add_listener(&self, listener: Arc<dyn CacheListener>) -> CacheResult<ListenerId> {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.listeners.insert(id, listener);
        debug!(listener_id = id, "InMemory: listener added");
        Ok(ListenerId(id))
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(&id.0).is_some();
        debug!(listener_id = id.0, removed, "InMemory: listener removed");
        removed
    }
}
