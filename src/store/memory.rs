//! In-process storage for tests and `--in-memory` runs. Nothing survives a restart.

use async_trait::async_trait;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use super::{
    generate_session_token, hash_session_token, SessionStore, StoreError, User, UserStore,
    UserUpdate,
};

#[derive(Debug, Default)]
struct Users {
    rows: Vec<User>,
    next_id: i64,
}

#[derive(Debug)]
struct SessionEntry {
    user_id: i64,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<Users>,
    sessions: RwLock<HashMap<Vec<u8>, SessionEntry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .rows
            .iter()
            .filter(|user| user.email == email)
            .cloned()
            .collect())
    }

    async fn find_one(&self, id: i64) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.rows.iter().find(|user| user.id == id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.users.read().await.rows.clone())
    }

    async fn create(&self, email: &str, password: &str) -> Result<User, StoreError> {
        // Uniqueness is checked under the write lock, mirroring a unique index.
        let mut users = self.users.write().await;
        if users.rows.iter().any(|user| user.email == email) {
            return Err(StoreError::Conflict);
        }

        users.next_id += 1;
        let user = User {
            id: users.next_id,
            email: email.to_string(),
            password: password.to_string(),
        };
        users.rows.push(user.clone());
        Ok(user)
    }

    async fn update(&self, id: i64, changes: UserUpdate) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;

        if let Some(email) = &changes.email {
            if users
                .rows
                .iter()
                .any(|user| user.id != id && &user.email == email)
            {
                return Err(StoreError::Conflict);
            }
        }

        let Some(user) = users.rows.iter_mut().find(|user| user.id == id) else {
            return Ok(None);
        };

        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(password) = changes.password {
            user.password = password;
        }
        Ok(Some(user.clone()))
    }

    async fn remove(&self, id: i64) -> Result<Option<User>, StoreError> {
        let removed = {
            let mut users = self.users.write().await;
            users
                .rows
                .iter()
                .position(|user| user.id == id)
                .map(|index| users.rows.remove(index))
        };

        // Match the ON DELETE CASCADE on user_sessions.
        if removed.is_some() {
            self.sessions
                .write()
                .await
                .retain(|_, entry| entry.user_id != id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, user_id: i64, ttl_seconds: i64) -> Result<String, StoreError> {
        let token = generate_session_token()?;
        let ttl = Duration::from_secs(u64::try_from(ttl_seconds).unwrap_or(0));
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        // Evict expired sessions so the map stays bounded by live ones.
        sessions.retain(|_, entry| entry.expires_at > now);
        sessions.insert(
            hash_session_token(&token),
            SessionEntry {
                user_id,
                expires_at: now + ttl,
            },
        );
        Ok(token)
    }

    async fn lookup_session(&self, token: &str) -> Result<Option<i64>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(&hash_session_token(token))
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.user_id))
    }

    async fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .remove(&hash_session_token(token));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn create_assigns_increasing_ids() -> Result<()> {
        let store = MemoryStore::new();
        let first = store.create("a@example.com", "s.h").await?;
        let second = store.create("b@example.com", "s.h").await?;
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(store.find_all().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email() -> Result<()> {
        let store = MemoryStore::new();
        store.create("a@example.com", "first").await?;
        let result = store.create("a@example.com", "second").await;
        assert!(matches!(result, Err(StoreError::Conflict)));

        let users = store.find_by_email("a@example.com").await?;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].password, "first");
        Ok(())
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() -> Result<()> {
        let store = MemoryStore::new();
        let user = store.create("a@example.com", "old").await?;

        let updated = store
            .update(
                user.id,
                UserUpdate {
                    email: None,
                    password: Some("new".to_string()),
                },
            )
            .await?;
        assert_eq!(
            updated.map(|u| (u.email, u.password)),
            Some(("a@example.com".to_string(), "new".to_string()))
        );

        let missing = store.update(99, UserUpdate::default()).await?;
        assert!(missing.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn update_rejects_taken_email() -> Result<()> {
        let store = MemoryStore::new();
        store.create("a@example.com", "x").await?;
        let other = store.create("b@example.com", "y").await?;

        let result = store
            .update(
                other.id,
                UserUpdate {
                    email: Some("a@example.com".to_string()),
                    password: None,
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::Conflict)));

        // Re-saving your own email is not a conflict.
        let same = store
            .update(
                other.id,
                UserUpdate {
                    email: Some("b@example.com".to_string()),
                    password: None,
                },
            )
            .await?;
        assert!(same.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn remove_returns_user_and_drops_sessions() -> Result<()> {
        let store = MemoryStore::new();
        let user = store.create("a@example.com", "x").await?;
        let token = store.create_session(user.id, 60).await?;

        let removed = store.remove(user.id).await?;
        assert_eq!(removed.map(|u| u.id), Some(user.id));
        assert!(store.find_one(user.id).await?.is_none());
        assert!(store.lookup_session(&token).await?.is_none());
        assert!(store.remove(user.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn sessions_resolve_until_deleted() -> Result<()> {
        let store = MemoryStore::new();
        let token = store.create_session(7, 60).await?;
        assert_eq!(store.lookup_session(&token).await?, Some(7));
        assert_eq!(store.lookup_session("unknown").await?, None);

        store.delete_session(&token).await?;
        assert_eq!(store.lookup_session(&token).await?, None);

        // Deleting twice is fine.
        store.delete_session(&token).await?;
        Ok(())
    }

    #[tokio::test]
    async fn expired_sessions_do_not_resolve() -> Result<()> {
        let store = MemoryStore::new();
        let token = store.create_session(7, 0).await?;
        assert_eq!(store.lookup_session(&token).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn create_session_evicts_expired_sessions() -> Result<()> {
        let store = MemoryStore::new();
        let stale = store.create_session(7, 0).await?;
        let live = store.create_session(7, 3600).await?;

        let sessions = store.sessions.read().await;
        assert_eq!(sessions.len(), 1);
        assert!(!sessions.contains_key(&hash_session_token(&stale)));
        assert!(sessions.contains_key(&hash_session_token(&live)));
        Ok(())
    }
}
