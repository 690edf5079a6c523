//! scrypt credential derivation and the `"salt.hash"` record format.
//!
//! Parameters are `N=16384, r=8, p=1` with a 32-byte output. The salt fed to
//! scrypt is the ASCII hex string itself, not its decoded bytes; existing
//! records depend on that.

use rand::{rngs::OsRng, RngCore};
use scrypt::Params;
use subtle::ConstantTimeEq;

use super::CredentialError;

pub const SALT_LEN: usize = 8;
pub const HASH_LEN: usize = 32;
pub const SEPARATOR: char = '.';

const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// Random per-credential salt, hex encoded (`2 * SALT_LEN` characters).
pub fn generate_salt() -> Result<String, CredentialError> {
    let mut bytes = [0u8; SALT_LEN];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(hex::encode(bytes))
}

/// Derive the hex-encoded scrypt hash of `password` under `salt`.
pub fn derive_hash(password: &[u8], salt: &str) -> Result<String, CredentialError> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, HASH_LEN)
        .map_err(|e| CredentialError::Kdf(e.to_string()))?;
    let mut output = [0u8; HASH_LEN];
    scrypt::scrypt(password, salt.as_bytes(), &params, &mut output)
        .map_err(|e| CredentialError::Kdf(e.to_string()))?;
    Ok(hex::encode(output))
}

#[must_use]
pub fn compose(salt: &str, hash: &str) -> String {
    format!("{salt}{SEPARATOR}{hash}")
}

/// Borrowed view of a stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialRecord<'a> {
    pub salt: &'a str,
    pub hash: &'a str,
}

impl<'a> CredentialRecord<'a> {
    /// Split on the first separator; `None` when there is none.
    #[must_use]
    pub fn parse(stored: &'a str) -> Option<Self> {
        stored
            .split_once(SEPARATOR)
            .map(|(salt, hash)| Self { salt, hash })
    }
}

/// Constant-time comparison of a recomputed credential against the stored one.
#[must_use]
pub fn matches(candidate: &str, stored: &str) -> bool {
    bool::from(candidate.as_bytes().ct_eq(stored.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn salt_is_sixteen_hex_chars() -> Result<()> {
        let salt = generate_salt()?;
        assert_eq!(salt.len(), SALT_LEN * 2);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
        Ok(())
    }

    #[test]
    fn salts_differ() -> Result<()> {
        assert_ne!(generate_salt()?, generate_salt()?);
        Ok(())
    }

    #[test]
    fn derive_hash_is_deterministic() -> Result<()> {
        let first = derive_hash(b"secret", "0011223344556677")?;
        let second = derive_hash(b"secret", "0011223344556677")?;
        assert_eq!(first, second);
        assert_eq!(first.len(), HASH_LEN * 2);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        Ok(())
    }

    #[test]
    fn derive_hash_depends_on_salt_and_password() -> Result<()> {
        let base = derive_hash(b"secret", "0011223344556677")?;
        assert_ne!(base, derive_hash(b"secret", "7766554433221100")?);
        assert_ne!(base, derive_hash(b"secret2", "0011223344556677")?);
        Ok(())
    }

    #[test]
    fn derive_hash_matches_rfc7914_vector() -> Result<()> {
        // RFC 7914 section 12, N=16384 r=8 p=1, truncated to 32 bytes.
        let hash = derive_hash(b"pleaseletmein", "SodiumChloride")?;
        assert_eq!(
            hash,
            "7023bdcb3afd7348461c06cd81fd38ebfda8fbba904f8e3ea9b543f6545da1f2"
        );
        Ok(())
    }

    #[test]
    fn parse_splits_on_first_separator() {
        assert_eq!(
            CredentialRecord::parse("abcd.ef01"),
            Some(CredentialRecord {
                salt: "abcd",
                hash: "ef01"
            })
        );
        assert_eq!(
            CredentialRecord::parse("abcd.ef.01"),
            Some(CredentialRecord {
                salt: "abcd",
                hash: "ef.01"
            })
        );
        assert_eq!(CredentialRecord::parse("no-separator"), None);
    }

    #[test]
    fn compose_joins_with_separator() {
        assert_eq!(compose("abcd", "ef01"), "abcd.ef01");
    }

    #[test]
    fn matches_requires_exact_equality() {
        assert!(matches("abcd.ef01", "abcd.ef01"));
        assert!(!matches("abcd.ef01", "abcd.ef02"));
        assert!(!matches("abcd.ef01", "abcd.ef01ff"));
        assert!(!matches("", "abcd.ef01"));
    }
}
