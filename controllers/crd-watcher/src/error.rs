//! Controller-specific error types.

use bridge_runtime::{ClusterError, LoopError};
use kudo_client::KudoError;
use thiserror::Error;

/// Errors that can occur in the CRD watcher.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Cluster operation failed
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// KUDO package or installation error
    #[error("KUDO error: {0}")]
    Kudo(#[from] KudoError),

    /// Reconcile loop stopped abnormally
    #[error("Reconcile loop error: {0}")]
    Loop(#[from] LoopError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Observed object lacks required metadata
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Not exactly one BridgeInstance bridges the kind in the namespace
    #[error("expected one BridgeInstance matching {selector} in {namespace}, found {found}")]
    BridgeLookup {
        namespace: String,
        selector: String,
        found: usize,
    },

    /// Operator version is not a semantic version
    #[error("Invalid operator version {version:?}: {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: semver::Error,
    },
}

impl ControllerError {
    /// Stable label used in log fields
    pub fn category(&self) -> &'static str {
        match self {
            ControllerError::Kube(_) => "kube",
            ControllerError::Cluster(e) => e.category(),
            ControllerError::Kudo(e) => e.category(),
            ControllerError::Loop(_) => "loop",
            ControllerError::Serialization(_) => "serialization",
            ControllerError::InvalidConfig(_) => "config",
            ControllerError::InvalidResource(_) => "invalid_resource",
            ControllerError::BridgeLookup { .. } => "bridge_lookup",
            ControllerError::InvalidVersion { .. } => "invalid_version",
        }
    }
}
