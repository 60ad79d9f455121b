//! Controller-specific error types.

use bridge_runtime::{ClusterError, LoopError};
use crds::CrdError;
use thiserror::Error;

/// Errors that can occur in the KUDO Bridge Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Cluster operation failed
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// BridgeInstance content is invalid
    #[error("Invalid BridgeInstance: {0}")]
    Crd(#[from] CrdError),

    /// Reconcile loop stopped abnormally
    #[error("Reconcile loop error: {0}")]
    Loop(#[from] LoopError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Object lacks metadata needed to own companions
    #[error("Invalid resource: {0}")]
    InvalidResource(String),
}

impl ControllerError {
    /// Stable label used in log fields
    pub fn category(&self) -> &'static str {
        match self {
            ControllerError::Kube(_) => "kube",
            ControllerError::Cluster(e) => e.category(),
            ControllerError::Crd(_) | ControllerError::InvalidResource(_) => "invalid_resource",
            ControllerError::Loop(_) => "loop",
            ControllerError::InvalidConfig(_) => "config",
        }
    }
}
