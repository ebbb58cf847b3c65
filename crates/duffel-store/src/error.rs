//! Store-level error taxonomy.

use thiserror::Error;

/// Errors surfaced by a [`ContentStore`](crate::ContentStore).
///
/// These never escape the engine's public operations: the engine maps them
/// onto build-log lines and the status field of the returned record.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The caller's identity could not be adapted to a store session.
    #[error("session is unavailable for user '{0}'")]
    SessionUnavailable(String),

    /// The supplied session is no longer live.
    #[error("session {0} is not open")]
    SessionClosed(u64),

    /// A package already exists at the target location.
    #[error("package already exists at {0}")]
    PackageExists(String),

    /// No package definition exists at the given path.
    #[error("no package definition at {0}")]
    DefinitionMissing(String),

    /// No node exists at the given path.
    #[error("no node at {0}")]
    NodeNotFound(String),

    /// Backend-specific failure.
    #[error("{0}")]
    Backend(String),
}
