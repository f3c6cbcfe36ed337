use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceMapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config_manager::ConfigError),

    #[error("Debug session error: {0}")]
    Session(String),

    #[error("AI request error: {0}")]
    Ai(String),

    #[error("Knowledge store error: {0}")]
    Store(String),

    #[error("Trace not found: {0}")]
    TraceNotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, TraceMapError>;
