use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    auth::IdentityService,
    config::{Config, StoreBackend},
    database::MySqlStore,
    password::PasswordHasher,
    store::{MemoryStore, Store},
    token::TokenCodec,
};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub identity: IdentityService,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Arc<Self>> {
        let config = Config::load()?;
        let store = open_store(&config).await?;

        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Arc<Self> {
        let identity = IdentityService::new(
            store.clone(),
            PasswordHasher::new(config.bcrypt_cost),
            TokenCodec::new(config.jwt_secret.as_bytes(), config.jwt_expires_in),
        );

        Arc::new(Self {
            config,
            store,
            identity,
        })
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match config.store_backend {
        StoreBackend::MySql => Ok(Arc::new(MySqlStore::connect(&config.database).await?)),
        StoreBackend::Memory => {
            warn!("Using in-memory store, accounts and state are lost on restart");
            info!("In-memory store ready");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
