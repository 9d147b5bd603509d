use api_client::ClientError;
use authz::AuthzError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PermissionError {
    #[error("Network error while fetching permissions: {0}")]
    Network(#[from] ClientError),

    #[error("Permission payload rejected: {0}")]
    Schema(String),
}

impl PermissionError {
    /// True when the backend rejected the session (HTTP 401).
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, PermissionError::Network(ClientError::Unauthorized))
    }

    /// Whether a later retry might succeed. A rejected payload never will.
    pub fn is_transient(&self) -> bool {
        match self {
            PermissionError::Network(err) => err.is_transient(),
            PermissionError::Schema(_) => false,
        }
    }
}

impl From<AuthzError> for PermissionError {
    fn from(err: AuthzError) -> Self {
        PermissionError::Schema(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PermissionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_detection() {
        assert!(PermissionError::Network(ClientError::Unauthorized).is_unauthorized());
        assert!(!PermissionError::Network(ClientError::Forbidden).is_unauthorized());
        assert!(!PermissionError::Schema("x".into()).is_unauthorized());
    }

    #[test]
    fn test_transient_follows_client_error() {
        assert!(PermissionError::Network(ClientError::Connection("refused".into())).is_transient());
        assert!(PermissionError::Network(ClientError::Status {
            status: 503,
            message: String::new()
        })
        .is_transient());
        assert!(!PermissionError::Network(ClientError::Unauthorized).is_transient());
        assert!(!PermissionError::Schema("missing field `data`".into()).is_transient());
    }

    #[test]
    fn test_authz_error_becomes_schema() {
        let err: PermissionError = AuthzError::Schema("missing field `data`".into()).into();
        assert!(matches!(err, PermissionError::Schema(msg) if msg.contains("missing field")));
    }
}
