//! Error types for the permission model.
//!
//! # Security Note
//! Schema errors are surfaced to callers so they can fail closed. The
//! messages describe the shape that was expected, never the permissions a
//! user holds.

use thiserror::Error;

use crate::types::ProjectId;

/// Errors that can occur while building or decoding a permission snapshot.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// The backend payload did not match the documented permission schema.
    ///
    /// Treated exactly like a network failure by callers: nothing is cached
    /// and access is denied.
    #[error("Permission payload schema mismatch: {0}")]
    Schema(String),

    /// Two project grants were supplied for the same project.
    #[error("Duplicate grant for project {0}")]
    DuplicateProjectGrant(ProjectId),
}

impl From<serde_json::Error> for AuthzError {
    fn from(err: serde_json::Error) -> Self {
        AuthzError::Schema(err.to_string())
    }
}

/// A specialized Result type for permission model operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthzError::Schema("missing field `data`".to_string());
        assert_eq!(
            err.to_string(),
            "Permission payload schema mismatch: missing field `data`"
        );

        let err = AuthzError::DuplicateProjectGrant(ProjectId::from(5));
        assert_eq!(err.to_string(), "Duplicate grant for project 5");
    }

    #[test]
    fn test_serde_error_maps_to_schema() {
        let serde_err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
        let err: AuthzError = serde_err.into();
        assert!(matches!(err, AuthzError::Schema(_)));
    }
}
