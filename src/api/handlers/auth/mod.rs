//! Authentication endpoints.
//!
//! Flow overview:
//! - `signup` validates the payload, hands the password to the credential
//!   manager and opens a session for the new user.
//! - `signin` verifies the password the same way and opens a session.
//! - `signout` drops the session record and clears the cookie.
//! - `whoami` resolves the session cookie (or bearer token) to a user.
//!
//! Sessions are opaque random tokens. Only their SHA-256 is stored.

pub mod session;
pub mod signin;
pub mod signup;
pub mod state;
pub mod types;

pub use session::{signout, whoami};
pub use signin::signin;
pub use signup::signup;
pub use state::{AuthConfig, AuthState};
