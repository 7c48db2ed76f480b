// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Owner directory.
//!
//! Answers "who holds this session" from a fresh
//! [`list_owners`](ReplicationDelegate::list_owners) walk on every call.
//! Nothing is cached: backup ownership moves whenever the cache engine
//! rebalances buddies.

use crate::delegate::ReplicationDelegate;
use crate::error::Result;
use crate::keys::{ApplicationSessionKey, EntityKey, EntityKind, Owner};
use crate::tree_cache::TreeCache;
use std::collections::HashMap;
use tracing::debug;

/// Read-only owner queries over a delegate's cache.
pub struct OwnerDirectory<'a, C: TreeCache> {
    delegate: &'a ReplicationDelegate<C>,
}

impl<'a, C: TreeCache> OwnerDirectory<'a, C> {
    pub fn new(delegate: &'a ReplicationDelegate<C>) -> Self {
        Self { delegate }
    }

    /// Who holds `key`: [`Owner::Local`] if it is in the primary tree,
    /// [`Owner::Backup`] if only a peer's backup region has it, `None` if
    /// the cache does not know it at all.
    ///
    /// The primary copy wins: a key held locally reports [`Owner::Local`]
    /// even when peers also keep backups of it. Use
    /// [`owned_by`](Self::owned_by) to find what one peer backs up.
    pub async fn backup_owner_of(&self, key: &EntityKey) -> Result<Option<Owner>> {
        key.validate()?;
        let mut owners = self.delegate.list_owners(key.kind()).await?;
        Ok(owners.remove(key))
    }

    /// Every application session id currently tracked, with attribution.
    pub async fn application_sessions(&self) -> Result<HashMap<ApplicationSessionKey, Owner>> {
        let owners = self.delegate.list_owners(EntityKind::ApplicationSession).await?;
        Ok(owners
            .into_iter()
            .map(|(key, owner)| (key.application_key().clone(), owner))
            .collect())
    }

    /// Every protocol session id currently tracked, with attribution.
    pub async fn sessions(&self) -> Result<HashMap<EntityKey, Owner>> {
        self.delegate.list_owners(EntityKind::Session).await
    }

    /// Every key (both kinds) found only in `owner_id`'s backup region.
    ///
    /// Used when a peer leaves the cluster and its buddies have to take
    /// over. Sorted application sessions first, then protocol sessions.
    pub async fn owned_by(&self, owner_id: &str) -> Result<Vec<EntityKey>> {
        let mut keys = Vec::new();
        for kind in [EntityKind::ApplicationSession, EntityKind::Session] {
            let owners = self.delegate.list_owners(kind).await?;
            let mut found: Vec<EntityKey> = owners
                .into_iter()
                .filter(|(_, owner)| owner.node_id() == Some(owner_id))
                .map(|(key, _)| key)
                .collect();
            found.sort();
            keys.extend(found);
        }
        debug!(owner = owner_id, keys = keys.len(), "Collected keys backed up for owner");
        Ok(keys)
    }
}
