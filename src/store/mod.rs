//! User and session persistence.
//!
//! Handlers and the credential manager only see the [`UserStore`] and
//! [`SessionStore`] traits. [`PgStore`] is the production backend and
//! [`MemoryStore`] backs tests and `--in-memory` runs.

mod memory;
mod postgres;
mod token;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use token::{generate_session_token, hash_session_token};

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// A stored user. `password` holds the `"salt.hash"` credential, never plaintext.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Partial update applied by [`UserStore::update`]; `None` keeps the current value.
///
/// `password` must already be a derived credential.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl UserUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.password.is_none()
    }
}

impl fmt::Debug for UserUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserUpdate")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write (duplicate email or session hash).
    #[error("record already exists")]
    Conflict,
    #[error("failed to generate session token")]
    Token(#[from] rand::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Users whose email matches exactly; zero or one element in practice.
    async fn find_by_email(&self, email: &str) -> Result<Vec<User>, StoreError>;

    async fn find_one(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn find_all(&self) -> Result<Vec<User>, StoreError>;

    /// Insert a new user.
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] when the email is already taken.
    async fn create(&self, email: &str, password: &str) -> Result<User, StoreError>;

    /// Apply `changes` to user `id`, returning `None` if the user does not exist.
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] when the new email is already taken.
    async fn update(&self, id: i64, changes: UserUpdate) -> Result<Option<User>, StoreError>;

    /// Delete user `id`, returning the removed record.
    async fn remove(&self, id: i64) -> Result<Option<User>, StoreError>;

    /// Cheap liveness probe used by `/health`.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Open a session for `user_id` and return the raw token for the cookie.
    async fn create_session(&self, user_id: i64, ttl_seconds: i64) -> Result<String, StoreError>;

    /// Resolve a raw token to the user id of an unexpired session.
    async fn lookup_session(&self, token: &str) -> Result<Option<i64>, StoreError>;

    /// Idempotent; deleting an unknown token is not an error.
    async fn delete_session(&self, token: &str) -> Result<(), StoreError>;
}
