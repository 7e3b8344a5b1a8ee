use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;
use crate::store::StoreError;

/// Malformed or missing pipeline input. Scoring and matching fail fast on these
/// and never return a partial result.
#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("requirement #{index} has empty text")]
    EmptyRequirement { index: usize },

    #[error("evidence item #{index} has no id")]
    MissingEvidenceId { index: usize },

    #[error("duplicate evidence id '{id}'")]
    DuplicateEvidenceId { id: String },

    #[error("evidence claim '{evidence_id}' has confidence {confidence} outside 0..1")]
    ClaimConfidenceOutOfRange { evidence_id: String, confidence: f64 },

    #[error("{field} cannot be empty")]
    EmptyField { field: &'static str },
}

/// Failure taxonomy shared by every step result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputError,
    GenerationFailure,
    ValidationInconclusive,
    StoreFailure,
}

/// Typed failure record embedded in partial results instead of an unhandled error,
/// so callers can always render a "retry this step" affordance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    pub success: bool,
    pub error_kind: ErrorKind,
    pub message: String,
}

impl StepFailure {
    pub fn new(error_kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_kind,
            message: message.into(),
        }
    }

    pub fn generation(err: &LlmError) -> Self {
        Self::new(ErrorKind::GenerationFailure, err.to_string())
    }
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AppError::Input(_) => Some(ErrorKind::InputError),
            AppError::Generation(_) => Some(ErrorKind::GenerationFailure),
            AppError::Store(_) => Some(ErrorKind::StoreFailure),
            AppError::NotFound(_) | AppError::InvalidTransition(_) | AppError::Internal(_) => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Input(e) => (StatusCode::BAD_REQUEST, "INPUT_ERROR", e.to_string()),
            AppError::InvalidTransition(msg) => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION", msg.clone())
            }
            AppError::Generation(e) => {
                tracing::error!("Generation error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "GENERATION_FAILURE",
                    "The generation service failed; retry this step".to_string(),
                )
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {e}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORE_FAILURE",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "kind": self.kind(),
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
