//! Request/response types for auth and user endpoints.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::handlers::{normalize_email, valid_email, ApiError},
    store::User,
};

#[derive(ToSchema, Deserialize, Debug)]
pub struct CredentialsRequest {
    pub email: String,
    #[schema(value_type = String, format = Password)]
    pub password: SecretString,
}

impl CredentialsRequest {
    /// Normalize the email and reject obviously bad input.
    pub(crate) fn validate(self) -> Result<(String, SecretString), ApiError> {
        let email = normalize_email(&self.email);
        if !valid_email(&email) {
            return Err(ApiError::BadRequest("Invalid email"));
        }
        if self.password.expose_secret().is_empty() {
            return Err(ApiError::BadRequest("Invalid password"));
        }
        Ok((email, self.password))
    }
}

/// Public view of a user; the stored credential is never serialized.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
        }
    }
}

#[derive(ToSchema, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct UserUpdateRequest {
    pub email: Option<String>,
    #[schema(value_type = Option<String>, format = Password)]
    pub password: Option<SecretString>,
}

#[derive(IntoParams, Deserialize, Debug)]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    /// Exact email to match; omitted lists every user.
    pub email: Option<String>,
}
