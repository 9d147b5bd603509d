use api_client::ClientError;
use route_gate::RouteError;
use session::SessionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Route table error: {0}")]
    Route(#[from] RouteError),

    #[error("HTTP client error: {0}")]
    Client(#[from] ClientError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, AccessError>;
