//! Mock TreeCache for testing.
//!
//! Stores nodes in an [`InMemoryTreeCache`] and records every call made
//! through the [`TreeCache`] trait for assertions. Failures can be injected
//! per operation to exercise the delegate's error paths.

use session_replication::keys::EntityKey;
use session_replication::listener::LocalSessionManager;
use session_replication::path::CachePath;
use session_replication::tree_cache::{
    BoxFuture, CacheError, CacheEvent, CacheListener, CacheResult, FieldMap, InMemoryTreeCache,
    ListenerId, TreeCache,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// A recorded TreeCache call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheCall {
    Read { path: CachePath, include_all_fields: bool },
    Write { path: CachePath },
    RemoveFields { path: CachePath, fields: Vec<String> },
    Remove { path: CachePath },
    RemoveLocal { path: CachePath },
    Evict { path: CachePath },
    List { path: CachePath },
    SetupRegion { path: CachePath },
    RemoveRegion { region_id: String, path: CachePath },
}

/// Mock implementation of TreeCache that records all calls.
///
/// # Example
/// ```rust,ignore
/// let cache = Arc::new(MockTreeCache::new());
/// cache.set_fail_writes(true);
///
/// // Use in tests...
///
/// assert_eq!(cache.local_removals().await.len(), 1);
/// ```
pub struct MockTreeCache {
    inner: InMemoryTreeCache,
    calls: RwLock<Vec<CacheCall>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_remove_local: AtomicBool,
    fail_region_setup: AtomicBool,
    fail_region_teardown: AtomicBool,
    /// Paths whose child listing fails
    fail_listings: RwLock<HashSet<CachePath>>,
    /// add_listener() succeeds this many times, then fails
    listeners_allowed: AtomicUsize,
    listener_adds: AtomicUsize,
}

impl MockTreeCache {
    pub fn new() -> Self {
        Self {
            inner: InMemoryTreeCache::new(),
            calls: RwLock::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_remove_local: AtomicBool::new(false),
            fail_region_setup: AtomicBool::new(false),
            fail_region_teardown: AtomicBool::new(false),
            fail_listings: RwLock::new(HashSet::new()),
            listeners_allowed: AtomicUsize::new(usize::MAX),
            listener_adds: AtomicUsize::new(0),
        }
    }

    // =========================================================================
    // Failure Injection
    // =========================================================================

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_remove_local(&self, fail: bool) {
        self.fail_remove_local.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_region_setup(&self, fail: bool) {
        self.fail_region_setup.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_region_teardown(&self, fail: bool) {
        self.fail_region_teardown.store(fail, Ordering::SeqCst);
    }

    /// Make listing the children of `path` fail.
    pub async fn fail_listing(&self, path: CachePath) {
        self.fail_listings.write().await.insert(path);
    }

    /// Let `n` listener registrations succeed, then refuse the rest.
    pub fn allow_listeners(&self, n: usize) {
        self.listeners_allowed.store(n, Ordering::SeqCst);
    }

    // =========================================================================
    // Direct Access (not recorded)
    // =========================================================================

    /// Write fields straight into the backing store.
    pub async fn put(&self, path: &CachePath, fields: FieldMap) {
        self.inner.write_subtree(path, fields).await.unwrap();
    }

    /// Read fields straight from the backing store.
    pub async fn peek(&self, path: &CachePath) -> Option<FieldMap> {
        self.inner.read_subtree(path, true).await.unwrap()
    }

    /// Deliver an event to every registered listener.
    pub fn notify(&self, event: &CacheEvent) {
        self.inner.notify(event);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listener_count()
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    pub async fn calls(&self) -> Vec<CacheCall> {
        self.calls.read().await.clone()
    }

    pub async fn local_removals(&self) -> Vec<CachePath> {
        self.collect(|c| match c {
            CacheCall::RemoveLocal { path } => Some(path.clone()),
            _ => None,
        })
        .await
    }

    pub async fn cluster_removals(&self) -> Vec<CachePath> {
        self.collect(|c| match c {
            CacheCall::Remove { path } => Some(path.clone()),
            _ => None,
        })
        .await
    }

    pub async fn evictions(&self) -> Vec<CachePath> {
        self.collect(|c| match c {
            CacheCall::Evict { path } => Some(path.clone()),
            _ => None,
        })
        .await
    }

    pub async fn region_setups(&self) -> Vec<CachePath> {
        self.collect(|c| match c {
            CacheCall::SetupRegion { path } => Some(path.clone()),
            _ => None,
        })
        .await
    }

    pub async fn region_teardowns(&self) -> Vec<(String, CachePath)> {
        self.collect(|c| match c {
            CacheCall::RemoveRegion { region_id, path } => Some((region_id.clone(), path.clone())),
            _ => None,
        })
        .await
    }

    pub async fn writes(&self) -> Vec<CachePath> {
        self.collect(|c| match c {
            CacheCall::Write { path } => Some(path.clone()),
            _ => None,
        })
        .await
    }

    pub async fn field_removals(&self) -> Vec<(CachePath, Vec<String>)> {
        self.collect(|c| match c {
            CacheCall::RemoveFields { path, fields } => Some((path.clone(), fields.clone())),
            _ => None,
        })
        .await
    }

    /// Clear all recorded calls.
    pub async fn reset(&self) {
        self.calls.write().await.clear();
    }

    async fn collect<T>(&self, f: impl Fn(&CacheCall) -> Option<T>) -> Vec<T> {
        self.calls.read().await.iter().filter_map(f).collect()
    }

    async fn record(&self, call: CacheCall) {
        self.calls.write().await.push(call);
    }
}

impl Default for MockTreeCache {
    fn default() -> Self {
        Self::new()
    }
}

fn injected(what: &str) -> CacheError {
    CacheError(format!("injected {} failure", what))
}

impl TreeCache for MockTreeCache {
    fn read_subtree(&self, path: &CachePath, include_all_fields: bool) -> BoxFuture<'_, Option<FieldMap>> {
        let path = path.clone();
        Box::pin(async move {
            self.record(CacheCall::Read {
                path: path.clone(),
                include_all_fields,
            })
            .await;
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(injected("read"));
            }
            self.inner.read_subtree(&path, include_all_fields).await
        })
    }

    fn write_subtree(&self, path: &CachePath, fields: FieldMap) -> BoxFuture<'_, ()> {
        let path = path.clone();
        Box::pin(async move {
            self.record(CacheCall::Write { path: path.clone() }).await;
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(injected("write"));
            }
            self.inner.write_subtree(&path, fields).await
        })
    }

    fn remove_fields(&self, path: &CachePath, fields: Vec<String>) -> BoxFuture<'_, ()> {
        let path = path.clone();
        Box::pin(async move {
            self.record(CacheCall::RemoveFields {
                path: path.clone(),
                fields: fields.clone(),
            })
            .await;
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(injected("field removal"));
            }
            self.inner.remove_fields(&path, fields).await
        })
    }

    fn remove_subtree(&self, path: &CachePath) -> BoxFuture<'_, ()> {
        let path = path.clone();
        Box::pin(async move {
            self.record(CacheCall::Remove { path: path.clone() }).await;
            self.inner.remove_subtree(&path).await
        })
    }

    fn remove_subtree_local(&self, path: &CachePath) -> BoxFuture<'_, ()> {
        let path = path.clone();
        Box::pin(async move {
            self.record(CacheCall::RemoveLocal { path: path.clone() }).await;
            if self.fail_remove_local.load(Ordering::SeqCst) {
                return Err(injected("local remove"));
            }
            self.inner.remove_subtree_local(&path).await
        })
    }

    fn evict_subtree(&self, path: &CachePath) -> BoxFuture<'_, ()> {
        let path = path.clone();
        Box::pin(async move {
            self.record(CacheCall::Evict { path: path.clone() }).await;
            self.inner.evict_subtree(&path).await
        })
    }

    fn list_child_names(&self, path: &CachePath) -> BoxFuture<'_, Option<BTreeSet<String>>> {
        let path = path.clone();
        Box::pin(async move {
            self.record(CacheCall::List { path: path.clone() }).await;
            if self.fail_listings.read().await.contains(&path) {
                return Err(injected("listing"));
            }
            self.inner.list_child_names(&path).await
        })
    }

    fn setup_session_region(&self, path: &CachePath) -> BoxFuture<'_, ()> {
        let path = path.clone();
        Box::pin(async move {
            self.record(CacheCall::SetupRegion { path }).await;
            if self.fail_region_setup.load(Ordering::SeqCst) {
                return Err(injected("region setup"));
            }
            Ok(())
        })
    }

    fn remove_session_region(&self, region_id: &str, path: &CachePath) -> BoxFuture<'_, ()> {
        let call = CacheCall::RemoveRegion {
            region_id: region_id.to_string(),
            path: path.clone(),
        };
        Box::pin(async move {
            self.record(call).await;
            if self.fail_region_teardown.load(Ordering::SeqCst) {
                return Err(injected("region teardown"));
            }
            Ok(())
        })
    }

    fn add_listener(&self, listener: Arc<dyn CacheListener>) -> CacheResult<ListenerId> {
        let n = self.listener_adds.fetch_add(1, Ordering::SeqCst);
        if n >= self.listeners_allowed.load(Ordering::SeqCst) {
            return Err(injected("listener registration"));
        }
        self.inner.add_listener(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.remove_listener(id)
    }
}

// =============================================================================
// Recording session manager
// =============================================================================

/// A notification delivered to the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ChangedRemotely(EntityKey),
    RemovedRemotely(EntityKey),
    Passivated(EntityKey),
    Activated(EntityKey),
    Evicted(EntityKey),
}

/// LocalSessionManager that records every notification.
#[derive(Default)]
pub struct RecordingSessionManager {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    fn push(&self, n: Notification) {
        self.notifications.lock().unwrap().push(n);
    }
}

impl LocalSessionManager for RecordingSessionManager {
    fn session_changed_remotely(&self, key: &EntityKey) {
        self.push(Notification::ChangedRemotely(key.clone()));
    }

    fn session_removed_remotely(&self, key: &EntityKey) {
        self.push(Notification::RemovedRemotely(key.clone()));
    }

    fn session_passivated(&self, key: &EntityKey) {
        self.push(Notification::Passivated(key.clone()));
    }

    fn session_activated(&self, key: &EntityKey) {
        self.push(Notification::Activated(key.clone()));
    }

    fn session_evicted(&self, key: &EntityKey) {
        self.push(Notification::Evicted(key.clone()));
    }
}
