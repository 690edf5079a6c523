use utoipa::OpenApi;

use crate::api::handlers::{
    auth::{self, types},
    health, users, ErrorResponse,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::signup::signup,
        auth::signin::signin,
        auth::session::signout,
        auth::session::whoami,
        users::list_users,
        users::get_user,
        users::patch_user,
        users::delete_user,
    ),
    components(schemas(
        health::Health,
        types::CredentialsRequest,
        types::UserResponse,
        types::UserUpdateRequest,
        ErrorResponse,
    )),
    tags(
        (name = "auth", description = "Signup, signin and sessions"),
        (name = "users", description = "User management"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;
