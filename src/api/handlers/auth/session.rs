//! Session cookie handling plus the `signout` and `whoami` endpoints.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, error, instrument};

use super::{
    state::{AuthConfig, AuthState},
    types::UserResponse,
};
use crate::{
    api::handlers::{ApiError, ErrorResponse},
    store::User,
};

pub(crate) const SESSION_COOKIE_NAME: &str = "passgate_session";

#[utoipa::path(
    post,
    path = "/auth/signout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
#[instrument(skip(headers, auth_state))]
pub async fn signout(
    headers: HeaderMap,
    Extension(auth_state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        if let Err(err) = auth_state.sessions().delete_session(&token).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers)
}

#[utoipa::path(
    get,
    path = "/auth/whoami",
    responses(
        (status = 200, description = "Signed-in user", body = UserResponse),
        (status = 401, description = "You are not signed in", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip(headers, auth_state))]
pub async fn whoami(
    headers: HeaderMap,
    Extension(auth_state): Extension<Arc<AuthState>>,
) -> Response {
    match current_user(&headers, &auth_state).await {
        Ok(Some(user)) => (StatusCode::OK, Json(UserResponse::from(&user))).into_response(),
        Ok(None) => ApiError::Unauthorized("You are not signed in").into_response(),
        Err(err) => err.into_response(),
    }
}

/// Resolve the session cookie (or bearer token) to its user.
///
/// Returns `Ok(None)` when there is no token, the session is unknown or expired,
/// or the user has since been deleted.
pub(crate) async fn current_user(
    headers: &HeaderMap,
    auth_state: &AuthState,
) -> Result<Option<User>, ApiError> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    let Some(user_id) = auth_state.sessions().lookup_session(&token).await? else {
        debug!("session token did not resolve");
        return Ok(None);
    };
    Ok(auth_state.users().find_one(user_id).await?)
}

/// Open a session for `user` and answer with the user plus a session cookie.
pub(crate) async fn start_session(
    auth_state: &AuthState,
    user: &User,
    status: StatusCode,
) -> Response {
    let token = match auth_state
        .sessions()
        .create_session(user.id, auth_state.config().session_ttl_seconds())
        .await
    {
        Ok(token) => token,
        Err(err) => return ApiError::from(err).into_response(),
    };

    let mut headers = HeaderMap::new();
    match session_cookie(auth_state.config(), &token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return ApiError::Internal.into_response();
        }
    }

    (status, headers, Json(UserResponse::from(user))).into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        let val = val.trim();
        (key.trim() == SESSION_COOKIE_NAME && !val.is_empty()).then(|| val.to_string())
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
