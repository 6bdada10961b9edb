mod memory;
mod sqlite;


pub mod config;

use actix_web::http::StatusCode;
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// An account as returned to callers. The password never leaves storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub data: serde_json::Value,
    pub create_time: u64,
}

/// Everything needed to persist a new account. The password is plain text
/// here, the backend hashes it with a fresh salt.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: String,
    pub email: String,
    pub password: String,
    pub data: serde_json::Value,
    pub create_time: u64,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("account not found")]
    NotFound,

    #[error("email '{0}' is already taken")]
    Conflict(String),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("storage backend error")]
    Backend(#[from] anyhow::Error),
}

impl StorageError {
    pub fn status(&self) -> StatusCode {
        match self {
            StorageError::NotFound => StatusCode::NOT_FOUND,
            StorageError::Conflict(_) => StatusCode::CONFLICT,
            StorageError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            StorageError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Account persistence used by the handlers. Implementations must be safe
/// to share between actix workers.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persists a new account.
    ///
    /// # Returns
    ///
    /// * `Ok(account)` - The stored account, without password
    /// * `Err(StorageError::Conflict)` - The email is already taken
    async fn create(&self, account: NewAccount) -> StorageResult<Account>;

    /// Fails with `NotFound` if there is no account with this id.
    async fn get(&self, id: &str) -> StorageResult<Account>;

    /// Removes an account. Deleting an id that does not exist succeeds.
    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// Resolves an account from its login credentials.
    ///
    /// # Arguments
    ///
    /// * `email` - The login email
    /// * `password` - The plain-text password, compared against the salted hash
    ///
    /// # Returns
    ///
    /// `InvalidCredentials` for an unknown email and for a wrong password
    /// alike.
    async fn authenticate(&self, email: &str, password: &str) -> StorageResult<Account>;
}

const SALT_LENGTH: usize = 30;

/// The hash is generated using SHA256(password + salt).
pub fn get_password_hash(password: &str, salt: &str) -> String {
    let combined = format!("{password}{salt}");
    let hash = Sha256::digest(combined.as_bytes());
    format!("{:x}", hash)
}

/// Generates a random alphanumeric salt for one password.
pub fn generate_salt() -> String {
    let mut rng = thread_rng();
    (0..SALT_LENGTH)
        .map(|_| rng.sample(Alphanumeric) as char)
        .collect()
}

#[cfg(test)]
mod password_tests {
    use super::*;

    #[test]
    fn test_password() {
        let salt = generate_salt();
        assert_eq!(salt.len(), SALT_LENGTH);
        assert!(salt.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(salt, generate_salt());

        let hash = get_password_hash("secret123", &salt);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, get_password_hash("secret123", &salt));
        assert_ne!(hash, get_password_hash("secret124", &salt));
        assert_ne!(hash, get_password_hash("secret123", "other"));
    }

    #[test]
    fn test_error_status() {
        assert_eq!(StorageError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            StorageError::Conflict(String::from("a@b.c")).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            StorageError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        let err = StorageError::from(anyhow::anyhow!("disk full"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "storage backend error");
    }
}
