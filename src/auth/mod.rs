//! Admin credentials, session tokens and role permissions.

pub mod permissions;
pub mod token;

pub use permissions::Permission;
pub use token::{AuthError, Claims, IssuedToken, TokenService};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use sha2::{Digest, Sha256};

lazy_static! {
    /// Hash of a random secret nobody knows, checked when the email is unknown
    /// so a failed lookup costs the same as a wrong password.
    static ref UNKNOWN_ACCOUNT_HASH: String =
        hash_password(&uuid::Uuid::new_v4().to_string()).unwrap_or_default();
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Burn one password verification for a login whose email matched no account.
/// Always false.
pub fn verify_unknown_account(password: &str) -> bool {
    verify_password(password, &UNKNOWN_ACCOUNT_HASH)
}

/// SHA-256 hex digest of a session token. Only this digest is persisted.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-phc-string"));
    }

    #[test]
    fn test_unknown_account_check_does_full_verification() {
        assert!(PasswordHash::new(&UNKNOWN_ACCOUNT_HASH).is_ok());
        assert!(UNKNOWN_ACCOUNT_HASH.starts_with("$argon2"));
        assert!(!verify_unknown_account("admin123"));
        assert!(!verify_unknown_account(""));
    }

    #[test]
    fn test_hash_token_is_stable_hex() {
        let a = hash_token("abc");
        assert_eq!(a, hash_token("abc"));
        assert_ne!(a, hash_token("abd"));
        assert_eq!(
            a,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
