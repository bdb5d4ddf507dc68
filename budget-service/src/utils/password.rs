use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;

/// Plain-text password as submitted. Debug output is redacted.
#[derive(Debug, Clone)]
pub struct Password(Secret<String>);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(Secret::new(password.into()))
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.expose_secret().as_bytes()
    }
}

/// PHC-format Argon2id hash as stored in `users.password_hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hashes with Argon2id and a random salt.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| PasswordHashString::new(h.to_string()))
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Password hashing failed: {}", e)))
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(password: &Password, hash: &PasswordHashString) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash.as_str())
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Runs a verification against a throwaway hash so unknown emails take as long as wrong
/// passwords.
pub fn verify_dummy(password: &Password) {
    const DUMMY_HASH: &str =
        "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$J8PkH0dGqX5n1SRkMiX3ybDtWqgZnVUr0Lwa+u3v7kE";
    if let Ok(parsed) = PasswordHash::new(DUMMY_HASH) {
        let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
    }
}

/// Hashing is CPU-bound; keep it off the async workers.
pub async fn hash_password_blocking(password: Password) -> Result<PasswordHashString, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Hashing task failed: {}", e)))?
}

pub async fn verify_password_blocking(
    password: Password,
    hash: Option<PasswordHashString>,
) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => verify_password(&password, &hash),
        None => {
            verify_dummy(&password);
            Ok(false)
        }
    })
    .await
    .map_err(|e| AppError::InternalError(anyhow::anyhow!("Verification task failed: {}", e)))?
}
