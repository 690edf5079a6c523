//! Postgres-backed user and session storage.
//!
//! Expects the tables from `sql/schema.sql`. Every statement runs inside a
//! `db.query` span so traces show the SQL that was executed.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::{info_span, Instrument, Span};

use super::{
    generate_session_token, hash_session_token, SessionStore, StoreError, User, UserStore,
    UserUpdate,
};

const SESSION_INSERT_ATTEMPTS: usize = 3;

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password: row.try_get("password")?,
    })
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Conflict
    } else {
        StoreError::Database(err)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Vec<User>, StoreError> {
        let query = "SELECT id, email, password FROM users WHERE email = $1 ORDER BY id";
        let rows = sqlx::query(query)
            .bind(email)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        Ok(rows
            .iter()
            .map(user_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_one(&self, id: i64) -> Result<Option<User>, StoreError> {
        let query = "SELECT id, email, password FROM users WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn find_all(&self) -> Result<Vec<User>, StoreError> {
        let query = "SELECT id, email, password FROM users ORDER BY id";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        Ok(rows
            .iter()
            .map(user_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn create(&self, email: &str, password: &str) -> Result<User, StoreError> {
        let query = r"
            INSERT INTO users (email, password)
            VALUES ($1, $2)
            RETURNING id, email, password
        ";
        let row = sqlx::query(query)
            .bind(email)
            .bind(password)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .map_err(map_write_error)?;

        Ok(user_from_row(&row)?)
    }

    async fn update(&self, id: i64, changes: UserUpdate) -> Result<Option<User>, StoreError> {
        let query = r"
            UPDATE users
            SET
                email = COALESCE($1, email),
                password = COALESCE($2, password)
            WHERE id = $3
            RETURNING id, email, password
        ";
        let row = sqlx::query(query)
            .bind(changes.email)
            .bind(changes.password)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .map_err(map_write_error)?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn remove(&self, id: i64) -> Result<Option<User>, StoreError> {
        let query = "DELETE FROM users WHERE id = $1 RETURNING id, email, password";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("DELETE", query))
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, user_id: i64, ttl_seconds: i64) -> Result<String, StoreError> {
        let query = r"
            INSERT INTO user_sessions (user_id, session_hash, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
        ";

        // Retry on a session hash collision.
        for _ in 0..SESSION_INSERT_ATTEMPTS {
            let token = generate_session_token()?;
            let result = sqlx::query(query)
                .bind(user_id)
                .bind(hash_session_token(&token))
                .bind(ttl_seconds)
                .execute(&self.pool)
                .instrument(query_span("INSERT", query))
                .await;

            match result {
                Ok(_) => return Ok(token),
                Err(err) if is_unique_violation(&err) => {}
                Err(err) => return Err(StoreError::Database(err)),
            }
        }

        Err(StoreError::Conflict)
    }

    async fn lookup_session(&self, token: &str) -> Result<Option<i64>, StoreError> {
        let query = r"
            SELECT user_id
            FROM user_sessions
            WHERE session_hash = $1
              AND expires_at > NOW()
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(hash_session_token(token))
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        Ok(row.map(|row| row.try_get::<i64, _>("user_id")).transpose()?)
    }

    async fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        let query = "DELETE FROM user_sessions WHERE session_hash = $1";
        sqlx::query(query)
            .bind(hash_session_token(token))
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await?;
        Ok(())
    }
}
