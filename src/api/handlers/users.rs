//! User management endpoints under `/auth`.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{
    auth::{
        session::current_user,
        state::AuthState,
        types::{UserListQuery, UserResponse, UserUpdateRequest},
    },
    normalize_email, parse_user_id, valid_email, ApiError, ErrorResponse,
};
use crate::store::UserUpdate;

#[utoipa::path(
    get,
    path = "/auth/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 400, description = "Invalid user id", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip(auth_state))]
pub async fn get_user(
    Path(id): Path<String>,
    Extension(auth_state): Extension<Arc<AuthState>>,
) -> Result<Json<UserResponse>, ApiError> {
    let id = parse_user_id(&id)?;
    let user = auth_state
        .users()
        .find_one(id)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;
    Ok(Json(UserResponse::from(&user)))
}

#[utoipa::path(
    get,
    path = "/auth",
    params(UserListQuery),
    responses(
        (status = 200, description = "Matching users", body = [UserResponse])
    ),
    tag = "users"
)]
#[instrument(skip(auth_state))]
pub async fn list_users(
    Query(query): Query<UserListQuery>,
    Extension(auth_state): Extension<Arc<AuthState>>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = match query.email {
        Some(email) => {
            auth_state
                .users()
                .find_by_email(&normalize_email(&email))
                .await?
        }
        None => auth_state.users().find_all().await?,
    };
    Ok(Json(users.iter().map(UserResponse::from).collect()))
}

#[utoipa::path(
    patch,
    path = "/auth/{id}",
    params(("id" = i64, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid or empty update", body = ErrorResponse),
        (status = 401, description = "You are not signed in", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 409, description = "Email already in use", body = ErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip(headers, auth_state, payload))]
pub async fn patch_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(auth_state): Extension<Arc<AuthState>>,
    payload: Option<Json<UserUpdateRequest>>,
) -> Response {
    match update_user(&id, &headers, &auth_state, payload).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn update_user(
    id: &str,
    headers: &HeaderMap,
    auth_state: &AuthState,
    payload: Option<Json<UserUpdateRequest>>,
) -> Result<UserResponse, ApiError> {
    if current_user(headers, auth_state).await?.is_none() {
        return Err(ApiError::Unauthorized("You are not signed in"));
    }

    let id = parse_user_id(id)?;
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let email = match request.email {
        Some(email) => {
            let email = normalize_email(&email);
            if !valid_email(&email) {
                return Err(ApiError::BadRequest("Invalid email"));
            }
            Some(email)
        }
        None => None,
    };

    // Password changes get a fresh salt, never the previous one.
    let password = match request.password {
        Some(password) if password.expose_secret().is_empty() => {
            return Err(ApiError::BadRequest("Invalid password"));
        }
        Some(password) => Some(auth_state.credentials().derive(&password).await?),
        None => None,
    };

    let changes = UserUpdate { email, password };
    if changes.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update"));
    }

    let user = auth_state
        .users()
        .update(id, changes)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    info!(user_id = user.id, "user updated");

    Ok(UserResponse::from(&user))
}

#[utoipa::path(
    delete,
    path = "/auth/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Removed user", body = UserResponse),
        (status = 400, description = "Invalid user id", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip(auth_state))]
pub async fn delete_user(
    Path(id): Path<String>,
    Extension(auth_state): Extension<Arc<AuthState>>,
) -> Result<Json<UserResponse>, ApiError> {
    let id = parse_user_id(&id)?;
    let Some(user) = auth_state.users().remove(id).await? else {
        debug!(user_id = id, "delete for unknown user");
        return Err(ApiError::NotFound("User not found"));
    };

    info!(user_id = user.id, "user removed");

    Ok(Json(UserResponse::from(&user)))
}
