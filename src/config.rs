//! Configuration for the replication delegate.
//!
//! One [`DelegateConfig`] describes one deployed application on one node.
//! It is passed to [`ReplicationDelegate::new()`](crate::ReplicationDelegate::new)
//! and can be constructed programmatically or deserialized from JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use session_replication::config::DelegateConfig;
//!
//! let config = DelegateConfig {
//!     local_node_id: "node-1".into(),
//!     context_path: "/billing_host1".into(),
//!     application_name: "billing".into(),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! DelegateConfig
//! ├── local_node_id: String             # This node's cluster id
//! ├── context_path: String              # Context path + host, one path segment
//! ├── application_name: String          # Unique application name
//! ├── application_name_hash: Option     # Stable path token (derived if absent)
//! ├── granularity: session | attribute  # How attributes are laid out
//! ├── passivation_enabled: bool         # Register the passivation listener
//! └── paths: PathConfig                 # Reserved tree tokens
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "local_node_id": "node-1",
//!   "context_path": "billing_host1",
//!   "application_name": "billing",
//!   "granularity": "attribute",
//!   "passivation_enabled": true
//! }
//! ```

use crate::error::{ReplicationError, Result};
use crate::path::{hash_application_name, PathScheme};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// DelegateConfig: one per deployed application
// ═══════════════════════════════════════════════════════════════════════════════

/// Top-level configuration for one replication delegate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateConfig {
    /// Cluster id of the node running this delegate.
    /// Only used for logging; ownership is derived from the cache tree.
    pub local_node_id: String,

    /// Combined context path and host name, used as a single path segment.
    pub context_path: String,

    /// Application name. Unique per container.
    pub application_name: String,

    /// Stable token identifying the application in cache paths.
    /// Derived from `application_name` when not supplied.
    #[serde(default)]
    pub application_name_hash: Option<String>,

    /// How session attributes are laid out in the field mapping.
    #[serde(default)]
    pub granularity: ReplicationGranularity,

    /// Whether to register the passivation listener on start.
    #[serde(default = "default_false")]
    pub passivation_enabled: bool,

    /// Reserved tree tokens.
    #[serde(default)]
    pub paths: PathConfig,
}

fn default_false() -> bool {
    false
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            local_node_id: "local.dev.node.default".to_string(),
            context_path: "default_localhost".to_string(),
            application_name: "default".to_string(),
            application_name_hash: None,
            granularity: ReplicationGranularity::default(),
            passivation_enabled: false,
            paths: PathConfig::default(),
        }
    }
}

impl DelegateConfig {
    /// Create a minimal config for testing.
    pub fn for_testing(application_name: &str, context_path: &str) -> Self {
        Self {
            local_node_id: "test-node".to_string(),
            context_path: context_path.to_string(),
            application_name: application_name.to_string(),
            ..Default::default()
        }
    }

    /// The configured application hash, or one derived from the name.
    pub fn resolved_application_hash(&self) -> String {
        match &self.application_name_hash {
            Some(hash) => hash.clone(),
            None => hash_application_name(&self.application_name),
        }
    }

    /// Build the path scheme this config describes.
    pub fn path_scheme(&self) -> Result<PathScheme> {
        PathScheme::new(
            &self.paths,
            self.context_path.clone(),
            self.resolved_application_hash(),
        )
    }

    /// Check the config is usable.
    pub fn validate(&self) -> Result<()> {
        if self.local_node_id.is_empty() {
            return Err(ReplicationError::Config("local_node_id must not be empty".into()));
        }
        if self.application_name.is_empty() {
            return Err(ReplicationError::Config("application_name must not be empty".into()));
        }
        if self.paths.internal_marker.is_empty() {
            return Err(ReplicationError::Config("internal_marker must not be empty".into()));
        }
        self.path_scheme().map(|_| ())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ReplicationGranularity
// ═══════════════════════════════════════════════════════════════════════════════

/// How a record's attributes are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationGranularity {
    /// All attributes in one field.
    #[default]
    Session,
    /// One field per attribute.
    Attribute,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PathConfig: reserved tree tokens
// ═══════════════════════════════════════════════════════════════════════════════

/// Reserved tokens of the cache tree.
///
/// These must match what the cache engine and every other node use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConfig {
    /// First segment of every primary session path.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// First segment of the buddy-backup region.
    #[serde(default = "default_backup_root")]
    pub backup_root: String,

    /// Child name the cache engine uses for its own bookkeeping.
    /// Never reported as a session id.
    #[serde(default = "default_internal_marker")]
    pub internal_marker: String,
}

fn default_scope() -> String {
    "SIPSESSION".to_string()
}

fn default_backup_root() -> String {
    "_BUDDY_BACKUP_".to_string()
}

fn default_internal_marker() -> String {
    "_JBOSS_INTERNAL_".to_string()
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            backup_root: default_backup_root(),
            internal_marker: default_internal_marker(),
        }
    }
}
