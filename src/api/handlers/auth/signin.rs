//! `POST /auth/signin`

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
    path = "/auth/signin",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Signed in", body = UserResponse),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 401, description = "Email or password is not correct", body = ErrorResponse),
        (status = 404, description = "Email or password is not correct", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip(auth_state, payload))]
pub async fn signin(
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

    match auth_state.credentials().signin(&email, &password).await {
        Ok(user) => start_session(&auth_state, &user, StatusCode::OK).await,
        Err(err) => ApiError::from(err).into_response(),
    }
}
