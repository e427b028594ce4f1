use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("{operation} failed: {message}")]
    Collaborator {
        operation: &'static str,
        message: String,
    },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrchestratorError {
    /// Wraps a failed external call, tagging it with the port operation name.
    pub fn collaborator(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            operation,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
