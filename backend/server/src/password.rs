use thiserror::Error;
use tokio::task::{JoinError, spawn_blocking};

pub const DEFAULT_COST: u32 = 10;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("bcrypt failure: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("hashing task failed: {0}")]
    Task(#[from] JoinError),
}

/// bcrypt hashing, run on the blocking pool so request tasks keep moving.
#[derive(Clone, Copy, Debug)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let password = password.to_string();
        let cost = self.cost;

        Ok(spawn_blocking(move || bcrypt::hash(password, cost)).await??)
    }

    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let password = password.to_string();
        let hash = hash.to_string();

        Ok(spawn_blocking(move || bcrypt::verify(password, &hash)).await??)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hasher = PasswordHasher::new(4);

        let hash = hasher.hash("topsecret").await.unwrap();

        assert_ne!(hash, "topsecret");
        assert!(hasher.verify("topsecret", &hash).await.unwrap());
        assert!(!hasher.verify("topsecreT", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_salted() {
        let hasher = PasswordHasher::new(4);

        let first = hasher.hash("same-password").await.unwrap();
        let second = hasher.hash("same-password").await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_corrupt_hash() {
        let hasher = PasswordHasher::new(4);

        assert!(hasher.verify("anything", "not-a-bcrypt-hash").await.is_err());
    }

    #[tokio::test]
    async fn test_default_cost() {
        let hash = PasswordHasher::default().hash("topsecret").await.unwrap();

        assert!(hash.starts_with("$2b$10$"));
    }
}
