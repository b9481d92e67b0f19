//! # Store
//!
//! Persistence seam for accounts and simulator state.
//!
//! - `users`: one row per account (id, username, bcrypt hash)
//! - `user_states`: at most one row per account, unique on `user_id`
//! - Both state blobs are written together by a single upsert so readers never
//!   see one blob old and the other new
//!
//! [`crate::database::MySqlStore`] is the deployed backend, [`MemoryStore`]
//! backs local runs and tests.
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("account already exists")]
    Duplicate,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored state is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AccountRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StateRecord {
    pub user_id: i64,
    pub parties_json: String,
    pub parliament_json: String,
    pub last_updated: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_account(&self, username: &str) -> Result<Option<AccountRecord>, StoreError>;

    /// Returns the new account id, or [`StoreError::Duplicate`] if the
    /// username is taken.
    async fn insert_account(&self, username: &str, password_hash: &str)
    -> Result<i64, StoreError>;

    /// Inserts the record, or replaces both blobs and the timestamp of the
    /// existing one, in one atomic step.
    async fn upsert_state(&self, record: &StateRecord) -> Result<(), StoreError>;

    async fn find_state(&self, user_id: i64) -> Result<Option<StateRecord>, StoreError>;

    /// Returns whether a record was removed.
    async fn delete_state(&self, user_id: i64) -> Result<bool, StoreError>;

    async fn close(&self) {}
}

#[derive(Default)]
struct Tables {
    accounts: HashMap<String, AccountRecord>,
    last_account_id: i64,
    states: HashMap<i64, StateRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_account(&self, username: &str) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self.tables.read().await.accounts.get(username).cloned())
    }

    async fn insert_account(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;

        if tables.accounts.contains_key(username) {
            return Err(StoreError::Duplicate);
        }

        tables.last_account_id += 1;
        let id = tables.last_account_id;

        tables.accounts.insert(
            username.to_string(),
            AccountRecord {
                id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
            },
        );

        Ok(id)
    }

    async fn upsert_state(&self, record: &StateRecord) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .states
            .insert(record.user_id, record.clone());

        Ok(())
    }

    async fn find_state(&self, user_id: i64) -> Result<Option<StateRecord>, StoreError> {
        Ok(self.tables.read().await.states.get(&user_id).cloned())
    }

    async fn delete_state(&self, user_id: i64) -> Result<bool, StoreError> {
        Ok(self.tables.write().await.states.remove(&user_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user_id: i64, parties: &str) -> StateRecord {
        StateRecord {
            user_id,
            parties_json: parties.to_string(),
            parliament_json: r#"{"favoredParties":[],"factions":[]}"#.to_string(),
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_accounts() {
        let store = MemoryStore::new();

        let first = store.insert_account("alice", "hash-a").await.unwrap();
        let second = store.insert_account("bob", "hash-b").await.unwrap();
        assert_ne!(first, second);

        let alice = store.find_account("alice").await.unwrap().unwrap();
        assert_eq!(alice.id, first);
        assert_eq!(alice.password_hash, "hash-a");

        assert!(store.find_account("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_account() {
        let store = MemoryStore::new();

        store.insert_account("alice", "hash").await.unwrap();

        assert!(matches!(
            store.insert_account("alice", "other").await,
            Err(StoreError::Duplicate)
        ));
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let store = MemoryStore::new();

        store.upsert_state(&record(1, "[1]")).await.unwrap();
        store.upsert_state(&record(1, "[2]")).await.unwrap();
        store.upsert_state(&record(2, "[3]")).await.unwrap();

        assert_eq!(
            store.find_state(1).await.unwrap().unwrap().parties_json,
            "[2]"
        );
        assert_eq!(
            store.find_state(2).await.unwrap().unwrap().parties_json,
            "[3]"
        );
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();

        store.upsert_state(&record(1, "[]")).await.unwrap();

        assert!(store.delete_state(1).await.unwrap());
        assert!(!store.delete_state(1).await.unwrap());
        assert!(store.find_state(1).await.unwrap().is_none());
    }
}
