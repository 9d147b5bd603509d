use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid session grant: {0}")]
    InvalidGrant(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
