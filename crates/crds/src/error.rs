//! CRD helper errors

use thiserror::Error;

/// Errors raised while interpreting CRD contents
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrdError {
    /// The watched resource template lacks a required field
    #[error("crdSpec is missing {0}")]
    MissingTargetField(&'static str),

    /// The apiVersion cannot be split into group and version
    #[error("error finding group and version in {0:?}")]
    InvalidApiVersion(String),
}
