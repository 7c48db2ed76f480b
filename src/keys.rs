// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Session identifiers.
//!
//! An application session is the root container; protocol sessions always
//! live underneath exactly one application session. [`EntityKey`] ties the
//! two together so every delegate operation takes a single key argument.

use crate::error::{ReplicationError, Result};
use std::fmt;

/// Identifies an application session within one application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApplicationSessionKey {
    id: String,
    application_name: String,
}

impl ApplicationSessionKey {
    pub fn new(id: impl Into<String>, application_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            application_name: application_name.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }
}

impl fmt::Display for ApplicationSessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.id, self.application_name)
    }
}

/// High-availability id of a protocol session.
///
/// Opaque to this layer; the runtime decides how it is derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    id: String,
}

impl SessionKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// The two kinds of replicated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    ApplicationSession,
    Session,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::ApplicationSession => write!(f, "application_session"),
            EntityKind::Session => write!(f, "session"),
        }
    }
}

/// Key of one replicated entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    /// A root application session.
    Application(ApplicationSessionKey),
    /// A protocol session and the application session owning it.
    Session {
        parent: ApplicationSessionKey,
        key: SessionKey,
    },
}

impl EntityKey {
    pub fn application(key: ApplicationSessionKey) -> Self {
        Self::Application(key)
    }

    pub fn session(parent: ApplicationSessionKey, key: SessionKey) -> Self {
        Self::Session { parent, key }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Application(_) => EntityKind::ApplicationSession,
            Self::Session { .. } => EntityKind::Session,
        }
    }

    /// The application session this key lives under (itself for roots).
    pub fn application_key(&self) -> &ApplicationSessionKey {
        match self {
            Self::Application(key) => key,
            Self::Session { parent, .. } => parent,
        }
    }

    /// Id used for region bookkeeping: the application session id for roots,
    /// the HA session id for protocol sessions.
    pub fn region_id(&self) -> &str {
        match self {
            Self::Application(key) => key.id(),
            Self::Session { key, .. } => key.id(),
        }
    }

    /// Reject keys with empty id components.
    pub fn validate(&self) -> Result<()> {
        if self.application_key().id().is_empty() {
            return Err(ReplicationError::InvalidKey(
                "empty application session id".to_string(),
            ));
        }
        if let Self::Session { key, .. } = self {
            if key.id().is_empty() {
                return Err(ReplicationError::InvalidKey("empty session id".to_string()));
            }
        }
        Ok(())
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application(key) => write!(f, "{}", key),
            Self::Session { parent, key } => write!(f, "{}/{}", parent, key),
        }
    }
}

/// Which node holds the replica a directory entry was found in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Found in this node's primary tree.
    Local,
    /// Found in the buddy-backup region of the named node.
    Backup(String),
}

impl Owner {
    pub fn is_local(&self) -> bool {
        matches!(self, Owner::Local)
    }

    /// Owner id for backup entries, `None` for local ones.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Owner::Local => None,
            Owner::Backup(id) => Some(id),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Local => write!(f, "local"),
            Owner::Backup(id) => write!(f, "backup:{}", id),
        }
    }
}
