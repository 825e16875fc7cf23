//! Error handling for the prediction service
//!
//! Every failure inside the serving pipeline is one of these variants. The
//! dispatcher converts them into a client-facing `{ "error": ... }` body and
//! an HTTP status, so nothing escapes to the transport as an unhandled fault.

use actix_web::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed message returned while a deployment's model is unavailable.
pub const MODEL_UNAVAILABLE_MESSAGE: &str = "Model not loaded properly";

/// Main error type for the prediction service
#[derive(Error, Debug)]
pub enum PredictError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Artifact missing, unreadable or malformed
    #[error("Failed to load model artifact: {message}")]
    Load { message: String },

    /// One or more required fields absent from the request
    #[error("Missing input fields: {}", .fields.join(", "))]
    MissingFields { fields: Vec<String> },

    /// One or more required fields present but not numeric
    #[error("Invalid numeric value for field(s): {}", .fields.join(", "))]
    InvalidFields { fields: Vec<String> },

    /// Request body could not be interpreted as a record
    #[error("{message}")]
    InvalidRequest { message: String },

    /// The loaded artifact rejected the constructed row
    #[error("Prediction failed: {message}")]
    Inference { message: String },

    /// Request body exceeded the configured size limit
    #[error("Request body too large")]
    PayloadTooLarge,

    /// Model handle is not in the Ready state
    #[error("{}", MODEL_UNAVAILABLE_MESSAGE)]
    ModelUnavailable,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PredictError>;

/// Error body sent to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl PredictError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an artifact load error
    pub fn load<S: Into<String>>(message: S) -> Self {
        Self::Load {
            message: message.into(),
        }
    }

    /// Create an inference error
    pub fn inference<S: Into<String>>(message: S) -> Self {
        Self::Inference {
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// HTTP status this error maps to
    pub fn http_status(&self) -> StatusCode {
        match self {
            PredictError::MissingFields { .. }
            | PredictError::InvalidFields { .. }
            | PredictError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            PredictError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            PredictError::Config { .. }
            | PredictError::Load { .. }
            | PredictError::Inference { .. }
            | PredictError::ModelUnavailable
            | PredictError::Io(_)
            | PredictError::Serde(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = PredictError::config("Test config error");
        assert!(error.to_string().contains("Test config error"));

        let error = PredictError::inference("shape mismatch");
        assert_eq!(error.to_string(), "Prediction failed: shape mismatch");
    }

    #[test]
    fn test_missing_fields_message_lists_every_field() {
        let error = PredictError::MissingFields {
            fields: vec!["speed".into(), "temperature".into()],
        };
        assert_eq!(
            error.to_string(),
            "Missing input fields: speed, temperature"
        );
    }

    #[test]
    fn test_model_unavailable_message_is_fixed() {
        assert_eq!(
            PredictError::ModelUnavailable.to_string(),
            MODEL_UNAVAILABLE_MESSAGE
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            PredictError::InvalidFields {
                fields: vec!["x".into()]
            }
            .http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PredictError::ModelUnavailable.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            PredictError::PayloadTooLarge.http_status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_conversions() {
        let io_err: PredictError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(io_err, PredictError::Io(_)));

        let serde_err: PredictError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(serde_err, PredictError::Serde(_)));
    }
}
