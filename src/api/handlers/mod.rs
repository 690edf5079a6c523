//! API handlers and shared utilities.
//!
//! Handlers get their dependencies from an `Extension<Arc<AuthState>>` layer and
//! report failures through [`ApiError`], which maps domain errors to status codes.

pub mod auth;
pub mod health;
pub mod root;
pub mod users;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::{credentials::CredentialError, store::StoreError};

/// Normalize an email for lookup/uniqueness checks.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Lightweight email sanity check on already-normalized input.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Path ids are positive integers; anything else is a bad request.
pub(crate) fn parse_user_id(id: &str) -> Result<i64, ApiError> {
    id.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or(ApiError::BadRequest("Invalid user id"))
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    Unauthorized(&'static str),
    NotFound(&'static str),
    Conflict(&'static str),
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Conflict(message) => (StatusCode::CONFLICT, message),
            Self::Internal => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        };
        let body = ErrorResponse {
            error: message.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::AlreadyExists => Self::Conflict("User already exists"),
            CredentialError::NotFound => Self::NotFound("Email or password is not correct"),
            CredentialError::InvalidCredentials => {
                Self::Unauthorized("Email or password is not correct")
            }
            err @ (CredentialError::Kdf(_) | CredentialError::Random(_)) => {
                error!("Credential derivation failed: {err}");
                Self::Internal
            }
            CredentialError::Store(err) => err.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => Self::Conflict("Email already in use"),
            err => {
                error!("Storage failure: {err}");
                Self::Internal
            }
        }
    }
}
