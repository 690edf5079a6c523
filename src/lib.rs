//! # Passgate
//!
//! `passgate` is a small user-authentication service: signup, signin, signout,
//! "who am I", and basic user management over a relational `users` table.
//!
//! ## Credentials
//!
//! Passwords are never stored. At signup the [`credentials::CredentialManager`]
//! generates an 8-byte random salt, derives a 32-byte key with scrypt
//! (`N=16384, r=8, p=1`) and stores `"<salt hex>.<hash hex>"`. Signin re-derives
//! the key with the stored salt and compares the full record in constant time.
//!
//! ## Storage
//!
//! Users and sessions live behind the [`store::UserStore`] and
//! [`store::SessionStore`] traits. Postgres is the production backend; an
//! in-memory backend exists for tests and throwaway runs.
//!
//! Email uniqueness is enforced by the store. A unique-constraint conflict on
//! insert is the authoritative "already exists" signal, so concurrent signups
//! for the same address cannot both succeed.
//!
//! ## Sessions
//!
//! Signup and signin return the user and open a session. Only the SHA-256 of
//! the session token is persisted; the raw token travels in the
//! `passgate_session` cookie (or an `Authorization: Bearer` header).

pub mod api;
pub mod cli;
pub mod credentials;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
