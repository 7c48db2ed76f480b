// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache path addressing.
//!
//! Maps session keys to positions in the tree cache. Construction is pure
//! structural concatenation, so distinct `(application session, session,
//! owner)` triples always map to distinct paths.
//!
//! # Layout
//!
//! ```text
//! /SIPSESSION/<context>/<app-hash>/<app-session-id>                      application session
//! /SIPSESSION/<context>/<app-hash>/<app-session-id>/<session-id>         protocol session
//! /_BUDDY_BACKUP_/<owner>/SIPSESSION/<context>/<app-hash>/<app-id>[/<session-id>]
//! ```
//!
//! `<context>` combines the web context path and host name; `<app-hash>`
//! disambiguates applications deployed under the same context.

use crate::config::PathConfig;
use crate::error::{ReplicationError, Result};
use crate::keys::EntityKey;
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters kept from the application name digest.
const APPLICATION_HASH_LEN: usize = 16;

/// An ordered sequence of path segments in the tree cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CachePath {
    segments: Vec<String>,
}

impl CachePath {
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Append one segment, returning the new path.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// The path with the last segment removed.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// True if `prefix` is an ancestor of (or equal to) this path.
    pub fn starts_with(&self, prefix: &CachePath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for CachePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// Components recovered from a path built by a [`PathScheme`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    /// Backup owner, `None` for the primary tree.
    pub owner: Option<String>,
    pub application_session_id: String,
    pub session_id: Option<String>,
}

/// Builds and parses the paths for one deployed application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathScheme {
    scope: String,
    backup_root: String,
    context_path: String,
    application_name_hash: String,
}

impl PathScheme {
    /// Create a scheme; every token must be non-empty.
    pub fn new(
        paths: &PathConfig,
        context_path: impl Into<String>,
        application_name_hash: impl Into<String>,
    ) -> Result<Self> {
        let scheme = Self {
            scope: paths.scope.clone(),
            backup_root: paths.backup_root.clone(),
            context_path: context_path.into(),
            application_name_hash: application_name_hash.into(),
        };
        for (name, value) in [
            ("scope", &scheme.scope),
            ("backup_root", &scheme.backup_root),
            ("context_path", &scheme.context_path),
            ("application_name_hash", &scheme.application_name_hash),
        ] {
            if value.is_empty() {
                return Err(ReplicationError::Config(format!("{} must not be empty", name)));
            }
        }
        if scheme.scope == scheme.backup_root {
            return Err(ReplicationError::Config(
                "scope and backup_root must differ".to_string(),
            ));
        }
        Ok(scheme)
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub fn application_name_hash(&self) -> &str {
        &self.application_name_hash
    }

    /// `/_BUDDY_BACKUP_`
    pub fn backup_root(&self) -> CachePath {
        CachePath::from_segments([self.backup_root.as_str()])
    }

    /// Root under which this application's session ids live.
    ///
    /// `[scope, context, hash]`, prefixed with `[backup_root, owner]` when an
    /// owner is given.
    pub fn application_root(&self, owner: Option<&str>) -> Result<CachePath> {
        let mut segments = Vec::with_capacity(5);
        if let Some(owner) = owner {
            require_segment("owner id", owner)?;
            segments.push(self.backup_root.clone());
            segments.push(owner.to_string());
        }
        segments.push(self.scope.clone());
        segments.push(self.context_path.clone());
        segments.push(self.application_name_hash.clone());
        Ok(CachePath { segments })
    }

    /// Path of an application session record.
    pub fn application_session(&self, app_session_id: &str, owner: Option<&str>) -> Result<CachePath> {
        require_segment("application session id", app_session_id)?;
        Ok(self.application_root(owner)?.child(app_session_id))
    }

    /// Path of a protocol session record.
    pub fn session(
        &self,
        app_session_id: &str,
        session_id: &str,
        owner: Option<&str>,
    ) -> Result<CachePath> {
        require_segment("session id", session_id)?;
        Ok(self
            .application_session(app_session_id, owner)?
            .child(session_id))
    }

    /// Resolve the primary (`owner = None`) or buddy-backup path of a key.
    pub fn for_entity(&self, key: &EntityKey, owner: Option<&str>) -> Result<CachePath> {
        match key {
            EntityKey::Application(app) => self.application_session(app.id(), owner),
            EntityKey::Session { parent, key } => self.session(parent.id(), key.id(), owner),
        }
    }

    /// Recover the ids from a path this scheme built.
    ///
    /// Returns `None` for paths belonging to another context or application,
    /// for the enumeration roots themselves, and for anything deeper than a
    /// protocol session record.
    pub fn parse(&self, path: &CachePath) -> Option<ParsedPath> {
        let segments = path.segments();
        let (owner, rest) = match segments.first() {
            Some(first) if *first == self.backup_root => {
                let owner = segments.get(1).filter(|owner| !owner.is_empty())?;
                (Some(owner.clone()), &segments[2..])
            }
            _ => (None, segments),
        };

        if rest.len() < 4 || rest.len() > 5 {
            return None;
        }
        if rest[0] != self.scope
            || rest[1] != self.context_path
            || rest[2] != self.application_name_hash
        {
            return None;
        }
        if rest[3..].iter().any(String::is_empty) {
            return None;
        }

        Some(ParsedPath {
            owner,
            application_session_id: rest[3].clone(),
            session_id: rest.get(4).cloned(),
        })
    }
}

fn require_segment(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ReplicationError::InvalidKey(format!("empty {}", what)));
    }
    Ok(())
}

/// Derive a stable path token from an application name.
///
/// Callers that already carry a hash for the deployed application should
/// keep using theirs; this is the fallback used when none is configured.
pub fn hash_application_name(application_name: &str) -> String {
    let digest = hex::encode(Sha256::digest(application_name.as_bytes()));
    digest[..APPLICATION_HASH_LEN].to_string()
}
