//! The request-level error type and conversions into it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};

use crate::render::RenderError;
use crate::storage::StorageError;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    /// Anonymous request to a gated page; answered with a redirect to the
    /// configured sign-in URL.
    Unauthorized {
        sign_in_url: String,
    },
    Forbidden(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Unauthorized { sign_in_url } => {
                Redirect::to(&sign_in_url).into_response()
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg).into_response(),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Traversal | StorageError::InvalidName => {
                AppError::BadRequest("invalid filename".into())
            }
            StorageError::Listing(err) => AppError::Internal(err.to_string()),
            StorageError::Save(err) => AppError::Internal(err.to_string()),
            StorageError::Io(err) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<RenderError> for AppError {
    fn from(error: RenderError) -> Self {
        match error {
            RenderError::MissingTemplate(name) => {
                AppError::Internal(format!("template {name} not found in any layer"))
            }
            RenderError::Io(err) => AppError::Internal(err.to_string()),
        }
    }
}
