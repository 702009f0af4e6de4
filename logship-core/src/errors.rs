use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShipperError>;

#[derive(Debug, Error)]
pub enum ShipperError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    // create-new found an existing ready file; the naming scheme was violated
    #[error("queue item already exists: {0}")]
    Collision(String),
    #[error("remote storage error: {0}")]
    Remote(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("uploader task failed to shut down: {0}")]
    Shutdown(String),
}

impl From<serde_json::Error> for ShipperError {
    fn from(err: serde_json::Error) -> Self {
        ShipperError::Serialization(err.to_string())
    }
}
