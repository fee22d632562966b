//! Error types for Coldcast.

use thiserror::Error;

use crate::types::{LifecycleStatus, ResourceKind};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Service error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{kind} {arn} ended in {status}{}", message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
    ResourceFailed {
        kind: ResourceKind,
        arn: String,
        status: LifecycleStatus,
        message: Option<String>,
    },

    #[error("Timed out after {waited_secs}s waiting for {kind} {arn}")]
    WaitTimeout {
        kind: ResourceKind,
        arn: String,
        waited_secs: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Service exception code, if this error came from the remote API.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            Self::NotFound(_) => Some("ResourceNotFoundException"),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_failed_display() {
        let err = Error::ResourceFailed {
            kind: ResourceKind::Predictor,
            arn: "arn:aws:forecast:us-east-1:1:predictor/p".into(),
            status: LifecycleStatus::CreateFailed,
            message: Some("not enough data".into()),
        };
        assert_eq!(
            err.to_string(),
            "Predictor arn:aws:forecast:us-east-1:1:predictor/p ended in CREATE_FAILED: not enough data"
        );

        let err = Error::ResourceFailed {
            kind: ResourceKind::Forecast,
            arn: "f".into(),
            status: LifecycleStatus::CreateFailed,
            message: None,
        };
        assert_eq!(err.to_string(), "Forecast f ended in CREATE_FAILED");
    }

    #[test]
    fn test_api_code() {
        let err = Error::Api {
            code: "ResourceInUseException".into(),
            message: "busy".into(),
        };
        assert_eq!(err.api_code(), Some("ResourceInUseException"));
        assert!(!err.is_not_found());
        assert!(Error::NotFound("x".into()).is_not_found());
        assert_eq!(Error::Config("x".into()).api_code(), None);
    }
}
