use crate::{
    api::{self, handlers::auth::AuthConfig, AuthState},
    store::{MemoryStore, PgStore, SessionStore, UserStore},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub enum Storage {
    Memory,
    Postgres { dsn: SecretString },
}

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub storage: Storage,
    pub session_ttl_seconds: i64,
    pub cookie_secure: bool,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let (users, sessions): (Arc<dyn UserStore>, Arc<dyn SessionStore>) = match &args.storage {
        Storage::Memory => {
            warn!("Using the in-memory store, users and sessions are lost on exit");
            let store = Arc::new(MemoryStore::new());
            let users: Arc<dyn UserStore> = store.clone();
            let sessions: Arc<dyn SessionStore> = store;
            (users, sessions)
        }
        Storage::Postgres { dsn } => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn.expose_secret())
                .await
                .context("Failed to connect to database")?;
            let store = Arc::new(PgStore::new(pool));
            let users: Arc<dyn UserStore> = store.clone();
            let sessions: Arc<dyn SessionStore> = store;
            (users, sessions)
        }
    };

    let config = AuthConfig::new()
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_session_cookie_secure(args.cookie_secure);

    api::new(args.port, Arc::new(AuthState::new(config, users, sessions))).await
}

fn log_startup_args(args: &Args) {
    let storage = match &args.storage {
        Storage::Memory => "memory".to_string(),
        Storage::Postgres { dsn } => redact_dsn(dsn.expose_secret()),
    };
    info!(
        port = args.port,
        storage = %storage,
        session_ttl_seconds = args.session_ttl_seconds,
        cookie_secure = args.cookie_secure,
        commit = crate::GIT_COMMIT_HASH,
        "Starting {}",
        crate::APP_USER_AGENT
    );
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}
