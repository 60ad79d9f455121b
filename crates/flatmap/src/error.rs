//! Flat map errors

use thiserror::Error;

/// Errors raised while parsing key paths for move and delete operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlatMapError {
    /// The path was empty
    #[error("path is empty")]
    EmptyPath,

    /// The path contained two consecutive separators or a leading/trailing one
    #[error("path {path:?} contains an empty segment")]
    EmptySegment {
        /// Offending path
        path: String,
    },

    /// The path nests more wildcards than supported
    #[error("path {path:?} has {found} wildcards, at most {max} are supported")]
    TooManyWildcards {
        /// Offending path
        path: String,
        /// Number of wildcards found
        found: usize,
        /// Supported maximum
        max: usize,
    },

    /// Source and destination of a move do not have the same wildcard layout
    #[error("cannot move {from:?} to {to:?}: wildcard count differs")]
    WildcardMismatch {
        /// Source path
        from: String,
        /// Destination path
        to: String,
    },
}
