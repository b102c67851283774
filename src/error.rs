//! Error types for the Asset Relay server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::github::RemoteError;
use crate::upload::UploadError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("File type not allowed")]
    FileTypeNotAllowed(String),

    #[error("File already exists")]
    AlreadyExists(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl AppError {
    pub fn missing_params(names: &[&str]) -> Self {
        Self::BadRequest(format!("Missing params: {}", names.join(", ")))
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, details) = match &self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", None),
            AppError::FileTypeNotAllowed(name) => (
                StatusCode::BAD_REQUEST,
                "FILE_TYPE_NOT_ALLOWED",
                Some(json!({ "fileName": name })),
            ),
            AppError::AlreadyExists(path) => (
                StatusCode::CONFLICT,
                "FILE_EXISTS",
                Some(json!({ "path": path })),
            ),
            AppError::Upload(e) => {
                let details = match e {
                    UploadError::IncompleteUpload { file, missing } => {
                        Some(json!({ "file": file, "missing": missing }))
                    }
                    _ => None,
                };
                (StatusCode::BAD_REQUEST, e.code(), details)
            }
            AppError::Remote(e) => {
                tracing::error!(step = %e.step, "Remote API error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "REMOTE_API_ERROR",
                    Some(json!({ "step": e.step, "status": e.status() })),
                )
            }
        };

        let body = Json(ErrorResponse {
            ok: false,
            error: self.to_string(),
            code,
            details,
        });

        (status, body).into_response()
    }
}
