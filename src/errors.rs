use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Machine-readable error kind carried on every error response.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    InvalidInput,
    VersionConflict,
    IntegrityError,
    Internal,
}

/// Why an upload failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFailure {
    /// The digest reported by the client differs from the one recomputed
    /// over the stored object.
    DigestMismatch { client: String, server: String },
    /// The hashing service could not produce a digest.
    HashingFailed { cause: String },
    /// The asset already failed verification; it must be re-uploaded.
    AlreadyCorrupt,
}

/// Error taxonomy shared by every resolver.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("version conflict: expected {expected}, actual {actual}")]
    VersionConflict { expected: i64, actual: i64 },

    #[error("integrity error: {}", describe_integrity(.0))]
    Integrity(IntegrityFailure),

    #[error("internal error: {0}")]
    Internal(String),
}

fn describe_integrity(failure: &IntegrityFailure) -> String {
    match failure {
        IntegrityFailure::DigestMismatch { client, server } => {
            format!("digest mismatch (client {client}, server {server})")
        }
        IntegrityFailure::HashingFailed { cause } => format!("hashing failed: {cause}"),
        IntegrityFailure::AlreadyCorrupt => {
            "asset failed verification; upload it again under a new ticket".to_string()
        }
    }
}

impl AppError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::VersionConflict { .. } => ErrorKind::VersionConflict,
            Self::Integrity(_) => ErrorKind::IntegrityError,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::VersionConflict { .. } => StatusCode::CONFLICT,
            Self::Integrity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<ErrorDetails> {
        match self {
            Self::VersionConflict { expected, actual } => Some(ErrorDetails::VersionConflict {
                expected: *expected,
                actual: *actual,
            }),
            Self::Integrity(IntegrityFailure::DigestMismatch { client, server }) => {
                Some(ErrorDetails::DigestMismatch {
                    client_sha256: client.clone(),
                    server_sha256: server.clone(),
                })
            }
            Self::Integrity(IntegrityFailure::HashingFailed { cause }) => {
                Some(ErrorDetails::Cause {
                    cause: cause.clone(),
                })
            }
            Self::Integrity(IntegrityFailure::AlreadyCorrupt) => Some(ErrorDetails::Cause {
                cause: "asset already marked corrupt".into(),
            }),
            _ => None,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

/// Structured payload attached to conflict and integrity errors.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum ErrorDetails {
    VersionConflict {
        expected: i64,
        actual: i64,
    },
    DigestMismatch {
        client_sha256: String,
        server_sha256: String,
    },
    Cause {
        cause: String,
    },
}

/// Wire representation of an error, decoded by the upload client as well.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Self::Internal(msg) = &self {
            tracing::error!("internal error: {}", msg);
        }
        (self.status_code(), Json(self.to_body())).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::internal(format!("database: {err}"))
    }
}

impl From<crate::services::object_store::StoreError> for AppError {
    fn from(err: crate::services::object_store::StoreError) -> Self {
        AppError::internal(format!("object store: {err}"))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::invalid(format!("request body: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::invalid(format!("path: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::invalid(format!("query: {}", rejection.body_text()))
    }
}

pub type AppResult<T> = Result<T, AppError>;
