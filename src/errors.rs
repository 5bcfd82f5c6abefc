// src/errors.rs
use std::fmt;
use std::path::PathBuf;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation failed: {}", summarize(.0))]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|e| e.field.as_str())
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidImage {
    #[error("Image data is empty")]
    Empty,

    #[error("Malformed data URL: expected data:image/<format>;base64,<payload>")]
    MalformedDataUrl,

    #[error("Unsupported MIME type '{0}': only image/* data URLs are accepted")]
    NotImage(String),

    #[error("Invalid base64 image data: {0}")]
    InvalidBase64(String),
}

#[derive(Error, Debug)]
pub enum ImageProcessingError {
    #[error("Failed to read image metadata: {0}")]
    Probe(String),

    #[error("Failed to encode image as {format}: {reason}")]
    Encode { format: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderResponseError {
    #[error("No response data returned by the images API")]
    NoResponseData,

    #[error("No image data in the first images API result")]
    NoImageData,

    #[error("No candidates in chat response")]
    NoCandidates,

    #[error("No content parts in chat response")]
    NoContentParts,

    #[error("No image data found in chat response")]
    NoInlineImage,

    #[error("Invalid image data in provider response: {0}")]
    InvalidImage(String),
}

#[derive(Error, Debug)]
pub enum GenerationFailure {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Provider(#[from] ProviderResponseError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Failed to read mock image '{}': {source}", .path.display())]
    MockImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    TryOn,
    Stylize,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::TryOn => f.write_str("generateTryOn"),
            Operation::Stylize => f.write_str("generateStylized"),
        }
    }
}

/// Operation-prefixed error; `source()` yields the original failure.
#[derive(Error, Debug)]
#[error("{operation} failed: {failure}")]
pub struct GenerationError {
    operation: Operation,
    #[source]
    failure: GenerationFailure,
}

impl GenerationError {
    pub fn new(operation: Operation, failure: impl Into<GenerationFailure>) -> Self {
        Self {
            operation,
            failure: failure.into(),
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn failure(&self) -> &GenerationFailure {
        &self.failure
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.failure, GenerationFailure::Validation(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.failure,
            GenerationFailure::Provider(_) | GenerationFailure::Transport(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal(message: impl fmt::Display, production: bool) -> Self {
        if production {
            ApiError::Internal("Internal Server Error".to_string())
        } else {
            ApiError::Internal(message.to_string())
        }
    }

    pub fn from_generation(err: GenerationError, production: bool) -> Self {
        match err.failure() {
            GenerationFailure::Validation(errors) => ApiError::Validation(errors.clone()),
            _ => ApiError::internal(&err, production),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Validation(errors) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Validation failed",
                "details": errors.0
            })),
            ApiError::Internal(message) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": message
                }))
            }
        }
    }
}
