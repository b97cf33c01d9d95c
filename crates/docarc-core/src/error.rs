//! Error types for document operations.
//!
//! Every fallible operation in this crate returns the crate-level
//! [`Result`] alias. Failures are synchronous and propagate with `?`;
//! a document operation either fully succeeds or fails as a whole.

use thiserror::Error;

use crate::cast::CastError;

/// Result type alias for document operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for document operations
#[derive(Error, Debug)]
pub enum Error {
    /// A value's runtime shape does not match the container or scalar
    /// kind the caller asked for.
    #[error("type mismatch at '{key}': expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Structural cast failure, with positional diagnostics.
    #[error(transparent)]
    Cast(#[from] CastError),

    /// A `$ref` path does not lead to an existing map node. Fatal to the
    /// whole resolution pass; there is no partial-success mode.
    #[error("unresolved reference: '{path}'")]
    UnresolvedReference { path: String },

    /// A `$ref` entry whose value is not a well-formed fragment.
    #[error("invalid reference {value:?}: {message}")]
    InvalidRef { value: String, message: String },

    /// A string field that should parse as an RFC 3339 timestamp but does not.
    #[error("invalid timestamp at '{key}': {message}")]
    InvalidTimestamp { key: String, message: String },

    /// A string field that should parse as a URL but does not.
    #[error("invalid URL at '{key}': {message}")]
    InvalidUrl { key: String, message: String },

    /// The raw tree handed to `unarchive` has a bare primitive at the root.
    #[error("document root must be a map or list, found {found}")]
    UnsupportedRoot { found: &'static str },

    /// A node was already materialized under a different application type.
    #[error("node already materialized as a different type (expected {expected})")]
    InflationConflict { expected: &'static str },
}
