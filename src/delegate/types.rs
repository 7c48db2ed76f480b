//! Delegate state types.
//!
//! Defines the lifecycle of a replication delegate.
//!
//! # State Transitions
//!
//! ```text
//!            start()                 stop()
//! Created ───────────→ Running ───────────→ Stopped
//!                         ↑                    │
//!                         └────── start() ─────┘
//! ```
//!
//! # State Descriptions
//!
//! - **Created**: Initial state after `ReplicationDelegate::new()`. No listeners registered.
//! - **Running**: Listeners registered with the cache; events reach the session manager.
//! - **Stopped**: Listeners released. Record operations still work; no events are forwarded.

/// State of a replication delegate.
///
/// See module docs for the state transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateState {
    /// Delegate created but not started.
    ///
    /// Call [`start()`](super::ReplicationDelegate::start) to register listeners.
    Created,

    /// Listeners registered with the cache.
    Running,

    /// Listeners released.
    ///
    /// The delegate may be started again.
    Stopped,
}

impl DelegateState {
    /// Whether `start()` is allowed from this state.
    pub fn can_start(self) -> bool {
        matches!(self, DelegateState::Created | DelegateState::Stopped)
    }
}

impl std::fmt::Display for DelegateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DelegateState::Created => write!(f, "Created"),
            DelegateState::Running => write!(f, "Running"),
            DelegateState::Stopped => write!(f, "Stopped"),
        }
    }
}
