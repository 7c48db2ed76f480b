// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the session replication layer.
//!
//! Errors are categorized by where they originate (the tree cache, the record
//! codec, the caller) and carry the cache path involved so a failure can be
//! traced back to a concrete session.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Write` | Yes | Writing a session record to the cache failed |
//! | `CacheRead` | Yes | The cache could not be read (transient) |
//! | `CacheRemove` | Yes | Remove or evict against the cache failed |
//! | `CorruptRecord` | No | Stored field mapping is not a valid record |
//! | `InvalidKey` | No | Empty or malformed key / owner id supplied |
//! | `Encode` | No | Record could not be serialized |
//! | `Config` | No | Configuration invalid |
//! | `Listener` | No | Listener registration rejected by the cache |
//! | `InvalidState` | No | Delegate lifecycle violation |
//!
//! # Propagation
//!
//! `CorruptRecord` never escapes [`ReplicationDelegate::load`]: the delegate
//! drops the local replica and reports the session as absent. Everything
//! else is returned to the caller as-is. Nothing is retried at this layer;
//! use [`ReplicationError::is_retryable()`] to decide whether to try again.
//!
//! [`ReplicationDelegate::load`]: crate::delegate::ReplicationDelegate::load

use crate::path::CachePath;
use crate::tree_cache::CacheError;
use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur while replicating session state.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Writing a record into the tree cache failed.
    ///
    /// Surfaced to the caller unchanged; retry and consistency policy belong
    /// to the cache engine.
    #[error("Replication write error ({path}): {message}")]
    Write {
        path: String,
        message: String,
        #[source]
        source: Option<CacheError>,
    },

    /// Reading from the tree cache failed.
    ///
    /// Distinct from a corrupt record: the data may be fine, the cache just
    /// could not be reached. Local replicas are never dropped for this.
    #[error("Cache read error ({path}): {message}")]
    CacheRead { path: String, message: String },

    /// Removing or evicting a subtree failed.
    #[error("Cache remove error ({path}): {message}")]
    CacheRemove { path: String, message: String },

    /// A stored field mapping could not be decoded into a session record.
    #[error("Corrupt record at {path}: {reason}")]
    CorruptRecord { path: String, reason: String },

    /// Empty or malformed key, session id, or owner id.
    ///
    /// Rejected before any cache access is attempted.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// A record could not be turned into a field mapping.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The cache refused a listener registration.
    #[error("Listener registration error: {0}")]
    Listener(String),

    /// Delegate lifecycle violation (e.g. `start()` on a running delegate).
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl ReplicationError {
    /// Create a write error for a path from a cache failure.
    pub fn write(path: &CachePath, source: CacheError) -> Self {
        Self::Write {
            path: path.to_string(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a read error for a path from a cache failure.
    pub fn cache_read(path: &CachePath, source: CacheError) -> Self {
        Self::CacheRead {
            path: path.to_string(),
            message: source.to_string(),
        }
    }

    /// Create a remove error for a path from a cache failure.
    pub fn cache_remove(path: &CachePath, source: CacheError) -> Self {
        Self::CacheRemove {
            path: path.to_string(),
            message: source.to_string(),
        }
    }

    /// Create a corrupt-record error.
    pub fn corrupt(path: &CachePath, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Write { .. } => true,
            Self::CacheRead { .. } => true,
            Self::CacheRemove { .. } => true,
            Self::CorruptRecord { .. } => false, // Data is bad at the source
            Self::InvalidKey(_) => false,
            Self::Encode(_) => false,
            Self::Config(_) => false,
            Self::Listener(_) => false,
            Self::InvalidState { .. } => false,
        }
    }

    /// Check if this error indicates a record that can never be decoded.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptRecord { .. })
    }
}
