//! `POST /auth/signup`

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    session::start_session,
    state::AuthState,
    types::{CredentialsRequest, UserResponse},
};
use crate::api::handlers::{ApiError, ErrorResponse};

#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "User created and signed in", body = UserResponse),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 409, description = "User already exists", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip(auth_state, payload))]
pub async fn signup(
    Extension(auth_state): Extension<Arc<AuthState>>,
    payload: Option<Json<CredentialsRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError::BadRequest("Missing payload").into_response();
    };

    let (email, password) = match request.validate() {
        Ok(valid) => valid,
        Err(err) => return err.into_response(),
    };

    match auth_state.credentials().signup(&email, &password).await {
        Ok(user) => start_session(&auth_state, &user, StatusCode::CREATED).await,
        Err(err) => ApiError::from(err).into_response(),
    }
}
