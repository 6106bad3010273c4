use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::tts::EngineError;

/// Closed set of failure categories exposed on the wire as `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    ConfigurationFailure,
    InvalidRequest,
    GenerationFailure,
    EncodingFailure,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::ConfigurationFailure => "configuration_failure",
            FailureCategory::InvalidRequest => "invalid_request",
            FailureCategory::GenerationFailure => "generation_failure",
            FailureCategory::EncodingFailure => "encoding_failure",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Configuration failure: {0}")]
    Configuration(String),

    #[error("{0}")]
    InvalidRequest(String),

    /// `kind` is the engine's own name for the failure; it is logged but
    /// never sent to clients.
    #[error("{message}")]
    Generation { kind: String, message: String },

    #[error("{0}")]
    Encoding(String),
}

impl AppError {
    pub fn generation(kind: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Generation {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            AppError::Configuration(_) => FailureCategory::ConfigurationFailure,
            AppError::InvalidRequest(_) => FailureCategory::InvalidRequest,
            AppError::Generation { .. } => FailureCategory::GenerationFailure,
            AppError::Encoding(_) => FailureCategory::EncodingFailure,
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Synthesis { kind, message } => AppError::Generation { kind, message },
            EngineError::MalformedAudio(msg) => {
                AppError::Encoding(format!("Malformed audio from engine: {}", msg))
            }
            EngineError::Io(e) => AppError::generation("WorkerIo", e.to_string()),
            EngineError::Protocol(msg) => AppError::generation("WorkerProtocol", msg),
            EngineError::Unavailable => {
                AppError::generation("EngineUnavailable", EngineError::Unavailable.to_string())
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureCategory>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let category = self.category();
        let message = self.to_string();

        let (status, kind) = match category {
            FailureCategory::InvalidRequest => (StatusCode::BAD_REQUEST, None),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, Some(category)),
        };

        match &self {
            AppError::Generation { kind: engine_kind, .. } => {
                tracing::error!(
                    "Request failed: {} ({}) - {}",
                    category.as_str(),
                    engine_kind,
                    message
                )
            }
            AppError::InvalidRequest(_) => {
                tracing::warn!("Rejected request: {}", message)
            }
            _ => tracing::error!("Request failed: {} - {}", category.as_str(), message),
        }

        (
            status,
            Json(ErrorResponse {
                error: message,
                kind,
            }),
        )
            .into_response()
    }
}
