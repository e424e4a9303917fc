#![forbid(unsafe_code)]

//! Errors raised by scope operations.

use futures::task::SpawnError;

/// Error type for scope lookups and task spawning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeError {
    /// An operation needed an ambient scope but none was entered.
    NoCurrentScope,
    /// Async work was requested on a scope chain with no spawner.
    NoSpawner,
    /// The spawner refused the task.
    Spawn {
        /// The executor behind the spawner has shut down.
        shutdown: bool,
    },
}

impl std::fmt::Display for ScopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCurrentScope => write!(f, "this operation requires a current scope"),
            Self::NoSpawner => write!(f, "no local spawner is attached to the scope chain"),
            Self::Spawn { shutdown: true } => write!(f, "failed to spawn task: executor shut down"),
            Self::Spawn { shutdown: false } => write!(f, "failed to spawn task"),
        }
    }
}

impl std::error::Error for ScopeError {}

impl From<SpawnError> for ScopeError {
    fn from(err: SpawnError) -> Self {
        Self::Spawn {
            shutdown: err.is_shutdown(),
        }
    }
}
