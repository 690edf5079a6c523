//! Password credentials: derivation at signup, verification at signin.
//!
//! The [`CredentialManager`] is the only place plaintext passwords are handled.
//! They arrive as [`SecretString`], are fed to scrypt on the blocking pool and
//! are never persisted or logged.

pub mod kdf;

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use thiserror::Error;
use tokio::task;
use tracing::{debug, info, instrument};

use crate::store::{StoreError, User, UserStore};

use self::kdf::CredentialRecord;

/// Salt used for the throwaway derivation when signin finds no user.
const DUMMY_SALT: &str = "0000000000000000";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("user already exists")]
    AlreadyExists,
    #[error("user not found")]
    NotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("key derivation failed: {0}")]
    Kdf(String),
    #[error("failed to generate salt")]
    Random(#[from] rand::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct CredentialManager {
    users: Arc<dyn UserStore>,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager").finish_non_exhaustive()
    }
}

impl CredentialManager {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Register `email` with a freshly salted credential.
    ///
    /// # Errors
    /// [`CredentialError::AlreadyExists`] if the email is taken, either by the
    /// lookup or by the store's unique constraint at insert time.
    #[instrument(skip(self, password))]
    pub async fn signup(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<User, CredentialError> {
        if !self.users.find_by_email(email).await?.is_empty() {
            debug!("signup rejected, email already registered");
            return Err(CredentialError::AlreadyExists);
        }

        let credential = self.derive(password).await?;

        let user = match self.users.create(email, &credential).await {
            Ok(user) => user,
            Err(StoreError::Conflict) => {
                debug!("signup lost the race on the unique email constraint");
                return Err(CredentialError::AlreadyExists);
            }
            Err(err) => return Err(err.into()),
        };

        info!(user_id = user.id, "user signed up");

        Ok(user)
    }

    /// Verify `password` against the credential stored for `email`.
    ///
    /// # Errors
    /// [`CredentialError::NotFound`] for an unknown email and
    /// [`CredentialError::InvalidCredentials`] when the password does not match.
    #[instrument(skip(self, password))]
    pub async fn signin(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<User, CredentialError> {
        let Some(user) = self.users.find_by_email(email).await?.into_iter().next() else {
            // Spend the same KDF time as a real attempt.
            let _ = derive_hash_blocking(password, DUMMY_SALT).await;
            debug!("signin for unknown email");
            return Err(CredentialError::NotFound);
        };

        let Some(record) = CredentialRecord::parse(&user.password) else {
            debug!(user_id = user.id, "stored credential has no separator");
            return Err(CredentialError::InvalidCredentials);
        };

        let hash = derive_hash_blocking(password, record.salt).await?;
        let candidate = kdf::compose(record.salt, &hash);

        if !kdf::matches(&candidate, &user.password) {
            debug!(user_id = user.id, "password mismatch");
            return Err(CredentialError::InvalidCredentials);
        }

        info!(user_id = user.id, "user signed in");

        Ok(user)
    }

    /// Build a new `"salt.hash"` credential with a fresh salt.
    ///
    /// # Errors
    /// Returns an error if the salt cannot be generated or derivation fails.
    pub async fn derive(&self, password: &SecretString) -> Result<String, CredentialError> {
        let salt = kdf::generate_salt()?;
        let hash = derive_hash_blocking(password, &salt).await?;
        Ok(kdf::compose(&salt, &hash))
    }
}

/// scrypt is deliberately slow; keep it off the async worker threads.
async fn derive_hash_blocking(
    password: &SecretString,
    salt: &str,
) -> Result<String, CredentialError> {
    let password = SecretString::from(password.expose_secret().to_owned());
    let salt = salt.to_owned();
    task::spawn_blocking(move || kdf::derive_hash(password.expose_secret().as_bytes(), &salt))
        .await
        .map_err(|e| CredentialError::Kdf(format!("key derivation task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, UserUpdate};
    use anyhow::{Context, Result};
    use async_trait::async_trait;

    /// Passes the email lookup but loses at the unique constraint on insert.
    struct LateConflictStore;

    #[async_trait]
    impl UserStore for LateConflictStore {
        async fn find_by_email(&self, _email: &str) -> Result<Vec<User>, StoreError> {
            Ok(Vec::new())
        }
        async fn find_one(&self, _id: i64) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn find_all(&self) -> Result<Vec<User>, StoreError> {
            Ok(Vec::new())
        }
        async fn create(&self, _email: &str, _password: &str) -> Result<User, StoreError> {
            Err(StoreError::Conflict)
        }
        async fn update(&self, _id: i64, _changes: UserUpdate) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn remove(&self, _id: i64) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
    }

    fn manager() -> (Arc<MemoryStore>, CredentialManager) {
        let store = Arc::new(MemoryStore::new());
        let manager = CredentialManager::new(store.clone());
        (store, manager)
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn is_hex(value: &str) -> bool {
        !value.is_empty() && value.chars().all(|c| c.is_ascii_hexdigit())
    }

    #[tokio::test]
    async fn signup_stores_salted_hash() -> Result<()> {
        let (_store, manager) = manager();
        let user = manager.signup("asdf@asdf.com", &secret("asdf")).await?;

        assert_eq!(user.email, "asdf@asdf.com");
        assert_ne!(user.password, "asdf");
        assert_eq!(user.password.matches('.').count(), 1);

        let (salt, hash) = user.password.split_once('.').context("missing separator")?;
        assert_eq!(salt.len(), 16);
        assert_eq!(hash.len(), 64);
        assert!(is_hex(salt));
        assert!(is_hex(hash));
        Ok(())
    }

    #[tokio::test]
    async fn same_password_gets_different_credentials() -> Result<()> {
        let (_store, manager) = manager();
        let first = manager.signup("one@example.com", &secret("same")).await?;
        let second = manager.signup("two@example.com", &secret("same")).await?;
        assert_ne!(first.password, second.password);
        Ok(())
    }

    #[tokio::test]
    async fn signup_rejects_email_in_use() -> Result<()> {
        let (store, manager) = manager();
        let first = manager.signup("asdf@asdf.com", &secret("asdf")).await?;

        let result = manager.signup("asdf@asdf.com", &secret("other")).await;
        assert!(matches!(result, Err(CredentialError::AlreadyExists)));

        let users = store.find_by_email("asdf@asdf.com").await?;
        assert_eq!(users, vec![first]);
        Ok(())
    }

    #[tokio::test]
    async fn signup_maps_insert_conflict_to_already_exists() {
        let manager = CredentialManager::new(Arc::new(LateConflictStore));
        let result = manager.signup("race@example.com", &secret("secret")).await;
        assert!(matches!(result, Err(CredentialError::AlreadyExists)));
    }

    #[tokio::test]
    async fn concurrent_signups_for_one_email_create_one_user() -> Result<()> {
        let (store, manager) = manager();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .signup("race@example.com", &secret(&format!("secret{i}")))
                        .await
                })
            })
            .collect();

        let mut created = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await? {
                Ok(_) => created += 1,
                Err(CredentialError::AlreadyExists) => rejected += 1,
                Err(err) => anyhow::bail!("unexpected signup error: {err}"),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(rejected, 3);
        assert_eq!(store.find_by_email("race@example.com").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn signin_unknown_email_is_not_found() {
        let (_store, manager) = manager();
        let result = manager.signin("asdf@asdf.com", &secret("password")).await;
        assert!(matches!(result, Err(CredentialError::NotFound)));
    }

    #[tokio::test]
    async fn signin_wrong_password_is_invalid() -> Result<()> {
        let (_store, manager) = manager();
        manager.signup("asdf@asdf.com", &secret("password1")).await?;

        let result = manager.signin("asdf@asdf.com", &secret("password")).await;
        assert!(matches!(result, Err(CredentialError::InvalidCredentials)));
        Ok(())
    }

    #[tokio::test]
    async fn signin_returns_user_for_correct_password() -> Result<()> {
        let (_store, manager) = manager();
        let created = manager.signup("asdf@asdf.com", &secret("password")).await?;

        let user = manager.signin("asdf@asdf.com", &secret("password")).await?;
        assert_eq!(user, created);
        Ok(())
    }

    #[tokio::test]
    async fn signin_rejects_malformed_stored_credential() -> Result<()> {
        let (store, manager) = manager();
        store.create("legacy@example.com", "plaintext").await?;

        let result = manager.signin("legacy@example.com", &secret("plaintext")).await;
        assert!(matches!(result, Err(CredentialError::InvalidCredentials)));
        Ok(())
    }

    #[tokio::test]
    async fn signin_accepts_externally_created_record() -> Result<()> {
        // A record written by another service using the same scheme.
        let (store, manager) = manager();
        let salt = "a1b2c3d4e5f60718";
        let hash = kdf::derive_hash(b"secret", salt)?;
        store
            .create("old@example.com", &kdf::compose(salt, &hash))
            .await?;

        let user = manager.signin("old@example.com", &secret("secret")).await?;
        assert_eq!(user.email, "old@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn full_scenario() -> Result<()> {
        let (_store, manager) = manager();

        let user = manager.signup("a@b.com", &secret("secret")).await?;
        assert_eq!(user.email, "a@b.com");

        let signed_in = manager.signin("a@b.com", &secret("secret")).await?;
        assert_eq!(signed_in, user);

        assert!(matches!(
            manager.signin("a@b.com", &secret("wrong")).await,
            Err(CredentialError::InvalidCredentials)
        ));
        assert!(matches!(
            manager.signup("a@b.com", &secret("secret2")).await,
            Err(CredentialError::AlreadyExists)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn derive_produces_verifiable_credential() -> Result<()> {
        let (store, manager) = manager();
        let user = manager.signup("a@b.com", &secret("old")).await?;

        let credential = manager.derive(&secret("new")).await?;
        assert_ne!(credential, user.password);
        store
            .update(
                user.id,
                crate::store::UserUpdate {
                    email: None,
                    password: Some(credential),
                },
            )
            .await?;

        manager.signin("a@b.com", &secret("new")).await?;
        assert!(matches!(
            manager.signin("a@b.com", &secret("old")).await,
            Err(CredentialError::InvalidCredentials)
        ));
        Ok(())
    }
}
