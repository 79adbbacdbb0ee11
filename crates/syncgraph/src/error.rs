//! Error types for sync operations.
//!
//! Every variant is scoped to a single resource instance. The engines turn
//! them into [`crate::ApplyResult::Failed`] and move on.

use crate::cache::ResourceKey;
use crate::kind::ResourceKind;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while syncing one resource.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A named dependency was not found in the cache or on the controller.
    #[error("{kind} '{key}' not found")]
    Unresolved {
        kind: ResourceKind,
        key: ResourceKey,
    },

    /// The controller refused or failed a request.
    #[error("{kind} '{key}': {source}")]
    Remote {
        kind: ResourceKind,
        key: String,
        #[source]
        source: towerkit::Error,
    },

    /// The object does not expose the requested role.
    #[error("{object} has no role '{role}'")]
    MissingRole { object: String, role: String },

    /// A declared reference is malformed or ambiguous.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// The manifest or settings are invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Writing a downloaded document failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Wrap a controller error with the resource it concerns.
    pub fn remote(kind: ResourceKind, key: impl ToString, source: towerkit::Error) -> Self {
        Self::Remote {
            kind,
            key: key.to_string(),
            source,
        }
    }
}
