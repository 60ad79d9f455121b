//! KUDO client errors

use thiserror::Error;

/// Errors that can occur while resolving or installing KUDO packages
#[derive(Debug, Error)]
pub enum KudoError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The repository answered with a non-success status
    #[error("Repository error: {0}")]
    Repository(String),

    /// YAML deserialization error (index or package files)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Archive could not be read
    #[error("Archive error: {0}")]
    Archive(#[from] std::io::Error),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// No package matches the requested name and versions
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// The package archive lacks required files or content
    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    /// A referenced cluster resource is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// An instance with the requested name already exists
    #[error("Instance {0} already exists")]
    InstanceExists(String),
}

impl KudoError {
    /// Stable label used in log fields
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            KudoError::Http(_) | KudoError::Repository(_) => "repository",
            KudoError::Yaml(_) | KudoError::Serialization(_) => "serialization",
            KudoError::Archive(_) | KudoError::InvalidPackage(_) => "package",
            KudoError::Kube(_) => "kube",
            KudoError::PackageNotFound(_) | KudoError::NotFound(_) => "not_found",
            KudoError::InstanceExists(_) => "conflict",
        }
    }
}
