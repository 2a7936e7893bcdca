use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("Unknown gate: {0}")]
    UnknownGate(String),

    #[error("Sweeper state error: {0}")]
    SweeperState(String),

    #[error("No tokio runtime available to spawn the sweeper")]
    NoRuntime,

    #[error("File system error: {0}")]
    FileSystemError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AdmissionError {
    /// Whether the error comes from bad configuration rather than the environment
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AdmissionError::ConfigurationError(_)
                | AdmissionError::InvalidLimit(_)
                | AdmissionError::JsonError(_)
        )
    }
}

/// Result type alias for admission controller operations
pub type Result<T> = std::result::Result<T, AdmissionError>;
