//! Error types for the entity catalog.
//!
//! All errors are strongly typed using thiserror. Not-found conditions are
//! never errors: lookups return `Ok(None)` and removals return `Ok(false)`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Upsert was handed an entity without a required identity field.
    #[error("entity is missing required field '{field}'")]
    MissingField {
        /// Which identity field was absent or empty.
        field: &'static str,
    },

    /// A filter expression did not match the `field=value` / `field!=value` grammar.
    #[error("invalid filter expression '{expr}': {reason}")]
    InvalidFilter {
        /// The offending expression as given by the caller.
        expr: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// An entity reference string could not be parsed.
    #[error("invalid entity reference '{value}': {reason}")]
    InvalidReference {
        /// The string that failed to parse.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Snapshot file could not be read or written.
    #[error("snapshot I/O failed at {path}: {source}")]
    Io {
        /// Path of the snapshot file involved.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// Snapshot (de)serialization failed.
    #[error("snapshot serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Internal invariant failure, e.g. a poisoned lock.
    #[error("catalog internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CatalogError::MissingField { field: "name" };
        assert!(err.to_string().contains("required field 'name'"));

        let err = CatalogError::InvalidFilter {
            expr: "owner".to_string(),
            reason: "missing operator",
        };
        assert!(err.to_string().contains("'owner'"));
        assert!(err.to_string().contains("missing operator"));

        let err = CatalogError::Internal("poisoned lock: store.upsert".to_string());
        assert!(err.to_string().contains("poisoned lock"));
    }
}
