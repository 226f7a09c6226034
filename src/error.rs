use thiserror::Error;

#[derive(Debug, Error)]
pub enum CopyTaskError {
    #[error("Invalid parameter {name}={value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Domain error: {0}")]
    DomainError(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CopyTaskError {
    pub(crate) fn invalid<V: ToString>(name: &'static str, value: V, reason: &'static str) -> Self {
        CopyTaskError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, CopyTaskError>;
