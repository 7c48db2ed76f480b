//! # Session Replication
//!
//! Clustered session addressing and buddy-backup replication for an
//! application-session runtime, over a tree-structured distributed cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                           session-replication                             │
//! │                                                                           │
//! │  ┌──────────────┐   ┌─────────────────────┐   ┌────────────────────────┐  │
//! │  │ runtime      │──►│ ReplicationDelegate │──►│ PathScheme + codec     │  │
//! │  │ (sessions)   │   │ store / load / ...  │   │ (addressing, records)  │  │
//! │  └──────────────┘   └─────────────────────┘   └────────────────────────┘  │
//! │         ▲                     │                            │              │
//! │         │                     ▼                            ▼              │
//! │  ┌──────────────┐   ┌─────────────────────┐   ┌────────────────────────┐  │
//! │  │ Listeners    │◄──│ TreeCache (engine)  │   │ OwnerDirectory         │  │
//! │  │ (events)     │   │ primary + backups   │   │ (who holds what)       │  │
//! │  └──────────────┘   └─────────────────────┘   └────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every session lives at a primary path:
//!
//! ```text
//! /SIPSESSION/<context>/<app-hash>/<app-session-id>[/<session-id>]
//! ```
//!
//! and, on the peers backing it up, under the same path prefixed with
//! `/_BUDDY_BACKUP_/<owner>`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use session_replication::{DelegateConfig, EntityKey, InMemoryTreeCache, ReplicationDelegate, SessionRecord};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> session_replication::Result<()> {
//!     let config = DelegateConfig::for_testing("billing", "host1");
//!     let mut delegate = ReplicationDelegate::new(config, Arc::new(InMemoryTreeCache::new()))?;
//!     delegate.start()?;
//!
//!     let key = EntityKey::application(delegate.application_key("A1"));
//!     delegate.store(&key, &SessionRecord::new(1)).await?;
//!     let record = delegate.load(&key, true).await?;
//!     assert_eq!(record.map(|r| r.version), Some(1));
//!
//!     delegate.stop();
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod delegate;
pub mod directory;
pub mod error;
pub mod keys;
pub mod listener;
pub mod metrics;
pub mod path;
pub mod tree_cache;

// Re-exports for convenience
pub use codec::{MetadataFields, SessionMetadata, SessionRecord};
pub use config::{DelegateConfig, PathConfig, ReplicationGranularity};
pub use delegate::{DelegateState, ReplicationDelegate};
pub use directory::OwnerDirectory;
pub use error::{ReplicationError, Result};
pub use keys::{ApplicationSessionKey, EntityKey, EntityKind, Owner, SessionKey};
pub use listener::{LocalSessionManager, NoOpSessionManager};
pub use path::{CachePath, PathScheme};
pub use tree_cache::{CacheError, CacheEvent, CacheEventKind, CacheListener, InMemoryTreeCache, TreeCache};
