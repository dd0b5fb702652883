//! Password hashing and credential verification (Argon2id).

use std::sync::Arc;

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::RngCore;
use tracing::info;

use crate::db::{Database, User};

/// Minimum password length in characters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length in characters.
pub const MAX_PASSWORD_LENGTH: usize = 128;

const DUMMY_PASSWORD: &str = "timing-equalizer-password";

/// Check a new password against the length policy.
pub fn check_password_policy(password: &str) -> Result<(), String> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }
    if len > MAX_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at most {} characters",
            MAX_PASSWORD_LENGTH
        ));
    }
    Ok(())
}

/// Errors from hashing work.
#[derive(Debug)]
pub enum PasswordError {
    Hash(argon2::password_hash::Error),
    /// The blocking task panicked or was cancelled
    Join(tokio::task::JoinError),
}

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordError::Hash(e) => write!(f, "Password hashing failed: {}", e),
            PasswordError::Join(e) => write!(f, "Password task failed: {}", e),
        }
    }
}

impl std::error::Error for PasswordError {}

/// Why a login attempt did not produce a user.
#[derive(Debug)]
pub enum AuthFailure {
    /// Unknown email or wrong password; callers must not tell them apart.
    InvalidCredentials,
    Store(sqlx::Error),
    Password(PasswordError),
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthFailure::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthFailure::Store(e) => write!(f, "Failed to look up user: {}", e),
            AuthFailure::Password(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AuthFailure {}

/// Hashes new passwords and checks login attempts.
#[derive(Clone)]
pub struct CredentialVerifier {
    params: Params,
    /// Verified against when the email is unknown, so both paths do the same work.
    dummy_hash: Arc<str>,
}

impl CredentialVerifier {
    /// Create a verifier with the given Argon2 cost parameters.
    /// Hashes the timing dummy synchronously; call this at startup.
    pub fn new(params: Params) -> Result<Self, PasswordError> {
        let dummy_hash = hash_with(&params, DUMMY_PASSWORD)?;
        Ok(Self {
            params,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// Hash a password into a PHC string on the blocking pool.
    pub async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let params = self.params.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hash_with(&params, &password))
            .await
            .map_err(PasswordError::Join)?
    }

    /// Check an email/password pair. Returns the user on success.
    pub async fn verify(
        &self,
        db: &Database,
        email: &str,
        password: &str,
    ) -> Result<User, AuthFailure> {
        let user = db
            .users()
            .get_by_email(email)
            .await
            .map_err(AuthFailure::Store)?;

        let stored_hash = match &user {
            Some(user) => user.password_hash.clone(),
            None => self.dummy_hash.to_string(),
        };
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_with(&stored_hash, &password))
            .await
            .map_err(|e| AuthFailure::Password(PasswordError::Join(e)))?;

        match user {
            Some(user) if matches => Ok(user),
            Some(user) => {
                info!(user_id = user.id, "Login failed: wrong password");
                Err(AuthFailure::InvalidCredentials)
            }
            None => {
                info!("Login failed: unknown email");
                Err(AuthFailure::InvalidCredentials)
            }
        }
    }
}

fn hash_with(params: &Params, password: &str) -> Result<String, PasswordError> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(PasswordError::Hash)?;

    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(PasswordError::Hash)
}

/// Constant-time comparison via the PHC parameters embedded in `stored_hash`.
/// A malformed stored hash never matches.
fn verify_with(stored_hash: &str, password: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, UserRole};

    fn fast_verifier() -> CredentialVerifier {
        CredentialVerifier::new(Params::new(8, 1, 1, None).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_hash_is_salted_argon2id() {
        let verifier = fast_verifier();
        let a = verifier.hash("correct horse").await.unwrap();
        let b = verifier.hash("correct horse").await.unwrap();

        assert!(a.starts_with("$argon2id$"));
        assert_ne!(a, b);
        assert!(verify_with(&a, "correct horse"));
        assert!(!verify_with(&a, "wrong horse"));
    }

    #[test]
    fn test_malformed_hash_never_matches() {
        assert!(!verify_with("plaintext", "plaintext"));
    }

    #[tokio::test]
    async fn test_verify_credentials() {
        let verifier = fast_verifier();
        let db = Database::open(":memory:").await.unwrap();
        let hash = verifier.hash("password123").await.unwrap();
        db.users()
            .create(&NewUser {
                email: "alice@example.com",
                name: Some("Alice"),
                password_hash: &hash,
                role: UserRole::Admin,
            })
            .await
            .unwrap();

        let user = verifier
            .verify(&db, "ALICE@example.com", "password123")
            .await
            .unwrap();
        assert_eq!(user.role, UserRole::Admin);

        assert!(matches!(
            verifier.verify(&db, "alice@example.com", "wrong").await,
            Err(AuthFailure::InvalidCredentials)
        ));
        assert!(matches!(
            verifier.verify(&db, "nobody@example.com", "password123").await,
            Err(AuthFailure::InvalidCredentials)
        ));
    }

    #[test]
    fn test_password_policy() {
        assert!(check_password_policy("short").is_err());
        assert!(check_password_policy("eight888").is_ok());
        assert!(check_password_policy(&"x".repeat(128)).is_ok());
        assert!(check_password_policy(&"x".repeat(129)).is_err());
    }
}
