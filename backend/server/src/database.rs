//! # MySQL
//!
//! Relational store behind the deployed server.
//!
//! ## Requirements
//!
//! - One account per username, enforced by a unique key
//! - One state row per account, enforced by a unique key on `user_id`
//! - Saves are a single `INSERT ... ON DUPLICATE KEY UPDATE`, last write wins
//!
//! ## Pool
//!
//! - Bounded by `DB_POOL_SIZE`, callers queue for up to `DB_ACQUIRE_TIMEOUT_SECS`
//! - Every query checks a connection out of the pool and hands it back on drop
//! - Closed after the server finishes its graceful shutdown
use async_trait::async_trait;
use sqlx::{
    MySqlPool,
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
};
use tracing::info;

use crate::{
    config::DatabaseConfig,
    store::{AccountRecord, StateRecord, Store, StoreError},
};

const CREATE_USERS: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        username VARCHAR(255) NOT NULL UNIQUE,
        password_hash VARCHAR(255) NOT NULL,
        created_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3)
    )
"#;

const CREATE_USER_STATES: &str = r#"
    CREATE TABLE IF NOT EXISTS user_states (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        user_id BIGINT NOT NULL UNIQUE,
        parties_json LONGTEXT NOT NULL,
        parliament_json LONGTEXT NOT NULL,
        last_updated DATETIME(3) NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
    )
"#;

pub async fn init_pool(config: &DatabaseConfig) -> Result<MySqlPool, sqlx::Error> {
    let options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.name);

    MySqlPoolOptions::new()
        .max_connections(config.pool_size)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
}

pub async fn ensure_schema(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_USERS).execute(pool).await?;
    sqlx::query(CREATE_USER_STATES).execute(pool).await?;

    Ok(())
}

pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        info!(
            "Connecting to MySQL at {}:{} (pool size {})",
            config.host, config.port, config.pool_size
        );

        let pool = init_pool(config).await?;
        let store = Self { pool };

        store.ping().await?;
        ensure_schema(&store.pool).await?;

        info!("Database connected successfully");

        Ok(store)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;

        Ok(())
    }
}

#[async_trait]
impl Store for MySqlStore {
    async fn find_account(&self, username: &str) -> Result<Option<AccountRecord>, StoreError> {
        let account = sqlx::query_as::<_, AccountRecord>(
            "SELECT id, username, password_hash FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn insert_account(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query("INSERT INTO users (username, password_hash) VALUES (?, ?)")
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => i64::try_from(done.last_insert_id()).map_err(|_| {
                StoreError::Database(sqlx::Error::Protocol(
                    "account id out of range".to_string(),
                ))
            }),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert_state(&self, record: &StateRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_states (user_id, parties_json, parliament_json, last_updated)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                parties_json = VALUES(parties_json),
                parliament_json = VALUES(parliament_json),
                last_updated = VALUES(last_updated)
            "#,
        )
        .bind(record.user_id)
        .bind(&record.parties_json)
        .bind(&record.parliament_json)
        .bind(record.last_updated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_state(&self, user_id: i64) -> Result<Option<StateRecord>, StoreError> {
        let state = sqlx::query_as::<_, StateRecord>(
            "SELECT user_id, parties_json, parliament_json, last_updated FROM user_states WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(state)
    }

    async fn delete_state(&self, user_id: i64) -> Result<bool, StoreError> {
        let done = sqlx::query("DELETE FROM user_states WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(done.rows_affected() > 0)
    }

    async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }
}
