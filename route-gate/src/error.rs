use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Failed to parse route table: {0}")]
    Parse(String),

    #[error("Invalid route metadata for '{route}': {message}")]
    InvalidMeta { route: String, message: String },

    #[error("Invalid route path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    #[error("Duplicate route name: {0}")]
    DuplicateName(String),

    #[error("Unknown route: {0}")]
    UnknownRoute(String),
}

impl From<serde_yaml::Error> for RouteError {
    fn from(err: serde_yaml::Error) -> Self {
        RouteError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RouteError>;
