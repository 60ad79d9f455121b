//! Runtime error types.

use thiserror::Error;

/// Errors from cluster operations
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The group/version/kind is not served by the cluster
    #[error("kind {gvk} is not served by the cluster: {reason}")]
    Discovery { gvk: String, reason: String },

    /// Create hit an object of the same name
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    /// Get, update or delete of a missing object
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// The object to write carries no name
    #[error("{0} object has no name")]
    MissingName(String),

    /// Conversion between typed and dynamic objects failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClusterError {
    /// Stable label used in log fields
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            ClusterError::Kube(_) => "kube",
            ClusterError::Discovery { .. } => "discovery",
            ClusterError::AlreadyExists { .. } => "already_exists",
            ClusterError::NotFound { .. } => "not_found",
            ClusterError::MissingName(_) => "invalid_object",
            ClusterError::Serialization(_) => "serialization",
        }
    }
}

/// Errors ending a reconcile loop
#[derive(Debug, Error)]
pub enum LoopError {
    /// The watch stream ended before the first full listing arrived
    #[error("watch for {0} ended before the cache synced")]
    CacheSync(String),
}
