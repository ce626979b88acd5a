/// Unified error types for the moderation subsystem
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for moderation operations
#[derive(Error, Debug)]
pub enum ModError {
    /// Missing or unparseable credential
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    /// Credential was well-formed but is past its validity window
    #[error("Credential expired: {0}")]
    CredentialExpired(String),

    /// Credential failed verification for any other reason
    #[error("Invalid credential: {0}")]
    CredentialInvalid(String),

    /// Insufficient privilege or disabled account
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid state transition or duplicate pending report
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable failure kind, independent of the human-readable message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Unauthenticated,
    CredentialExpired,
    CredentialInvalid,
    Forbidden,
    NotFound,
    Conflict,
    ValidationError,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::CredentialExpired => "CREDENTIAL_EXPIRED",
            ErrorKind::CredentialInvalid => "CREDENTIAL_INVALID",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::Unauthenticated
            | ErrorKind::CredentialExpired
            | ErrorKind::CredentialInvalid => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ModError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            ModError::CredentialExpired(_) => ErrorKind::CredentialExpired,
            ModError::CredentialInvalid(_) => ErrorKind::CredentialInvalid,
            ModError::Forbidden(_) => ErrorKind::Forbidden,
            ModError::NotFound(_) => ErrorKind::NotFound,
            ModError::Conflict(_) => ErrorKind::Conflict,
            ModError::Validation(_) => ErrorKind::ValidationError,
            ModError::Internal(_) | ModError::Database(_) | ModError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show a client. Internal failures never leak their cause.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Build a response, optionally attaching internal detail for development builds
    pub fn into_response_with(self, expose_internal: bool) -> Response {
        let kind = self.kind();
        let detail = if expose_internal && kind == ErrorKind::Internal {
            Some(self.to_string())
        } else {
            None
        };

        let body = Json(ErrorResponse {
            error: kind.as_str().to_string(),
            message: self.public_message(),
            detail,
        });

        (kind.status(), body).into_response()
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<validator::ValidationErrors> for ModError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ModError::Validation(errors.to_string())
    }
}

impl IntoResponse for ModError {
    fn into_response(self) -> Response {
        if self.kind() == ErrorKind::Internal {
            tracing::error!("Request failed: {}", self);
        }
        self.into_response_with(false)
    }
}

/// Result type alias for moderation operations
pub type ModResult<T> = Result<T, ModError>;
