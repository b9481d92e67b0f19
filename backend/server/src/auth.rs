//! # Identity
//!
//! Registration, login and token validation.
//!
//! - Usernames are unique and never change
//! - Passwords are at least [`MIN_PASSWORD_LENGTH`] characters, stored only as bcrypt hashes
//! - Unknown usernames and wrong passwords get the same [`AppError::InvalidCredentials`]
//! - Tokens are validated from their signature alone, the store is never consulted
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::info;

use crate::{
    error::AppError,
    password::PasswordHasher,
    store::{Store, StoreError},
    token::{Claims, TokenCodec},
};

pub const MIN_PASSWORD_LENGTH: usize = 6;

const DUMMY_PASSWORD: &str = "polsim-unknown-account";

#[derive(Deserialize, Debug, Default)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: Account,
}

struct Credentials {
    username: String,
    password: String,
}

pub struct IdentityService {
    store: Arc<dyn Store>,
    hasher: PasswordHasher,
    tokens: TokenCodec,
    // Hash checked on unknown usernames so both login failures cost one bcrypt verify.
    dummy_hash: OnceCell<String>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn Store>, hasher: PasswordHasher, tokens: TokenCodec) -> Self {
        Self {
            store,
            hasher,
            tokens,
            dummy_hash: OnceCell::new(),
        }
    }

    pub async fn register(&self, request: CredentialsRequest) -> Result<Session, AppError> {
        let Credentials { username, password } = require_credentials(request)?;

        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::validation(
                format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
                vec![format!(
                    "password: must be at least {MIN_PASSWORD_LENGTH} characters"
                )],
            ));
        }

        if self.store.find_account(&username).await?.is_some() {
            return Err(AppError::Conflict);
        }

        let password_hash = self.hasher.hash(&password).await?;

        let user_id = match self.store.insert_account(&username, &password_hash).await {
            Ok(id) => id,
            Err(StoreError::Duplicate) => return Err(AppError::Conflict),
            Err(e) => return Err(e.into()),
        };

        info!("Registered account {user_id}");

        self.session(user_id, username)
    }

    pub async fn login(&self, request: CredentialsRequest) -> Result<Session, AppError> {
        let Credentials { username, password } = require_credentials(request)?;

        let Some(account) = self.store.find_account(&username).await? else {
            let dummy_hash = self
                .dummy_hash
                .get_or_try_init(|| self.hasher.hash(DUMMY_PASSWORD))
                .await?;
            self.hasher.verify(&password, dummy_hash).await?;

            return Err(AppError::InvalidCredentials);
        };

        if !self.hasher.verify(&password, &account.password_hash).await? {
            return Err(AppError::InvalidCredentials);
        }

        self.session(account.id, account.username)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        self.tokens.validate(token).map_err(AppError::InvalidToken)
    }

    fn session(&self, user_id: i64, username: String) -> Result<Session, AppError> {
        let token = self
            .tokens
            .issue(user_id, &username)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(Session {
            token,
            user: Account { user_id, username },
        })
    }
}

fn require_credentials(request: CredentialsRequest) -> Result<Credentials, AppError> {
    let username = request.username.unwrap_or_default();
    let password = request.password.unwrap_or_default();

    let mut details = Vec::new();
    if username.is_empty() {
        details.push("username: is required".to_string());
    }
    if password.is_empty() {
        details.push("password: is required".to_string());
    }

    if !details.is_empty() {
        return Err(AppError::validation(
            "Username and password required",
            details,
        ));
    }

    Ok(Credentials { username, password })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryStore;

    fn service() -> IdentityService {
        IdentityService::new(
            Arc::new(MemoryStore::new()),
            PasswordHasher::new(4),
            TokenCodec::new(b"identity-secret", Duration::from_secs(3600)),
        )
    }

    fn credentials(username: &str, password: &str) -> CredentialsRequest {
        CredentialsRequest {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let service = service();

        let registered = service
            .register(credentials("alice", "topsecret"))
            .await
            .unwrap();
        let logged_in = service
            .login(credentials("alice", "topsecret"))
            .await
            .unwrap();

        assert_eq!(registered.user, logged_in.user);
        assert_eq!(registered.user.username, "alice");

        let claims = service.validate_token(&logged_in.token).unwrap();
        assert_eq!(claims.user_id, registered.user.user_id);
        assert_eq!(claims.username, "alice");
    }

    #[tokio::test]
    async fn test_register_twice() {
        let service = service();

        service
            .register(credentials("alice", "topsecret"))
            .await
            .unwrap();

        assert!(matches!(
            service.register(credentials("alice", "different")).await,
            Err(AppError::Conflict)
        ));
    }

    #[tokio::test]
    async fn test_password_floor() {
        let service = service();

        for password in ["a", "12345", "ñññññ"] {
            let result = service.register(credentials("bob", password)).await;
            assert!(matches!(result, Err(AppError::Validation { .. })));
        }

        assert!(service.register(credentials("bob", "123456")).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let service = service();

        let Err(AppError::Validation { details, .. }) =
            service.register(CredentialsRequest::default()).await
        else {
            panic!("expected validation error");
        };
        assert_eq!(details.len(), 2);

        assert!(matches!(
            service.login(credentials("", "topsecret")).await,
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(
            service.login(credentials("alice", "")).await,
            Err(AppError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_negative_login_is_uniform() {
        let service = service();
        service
            .register(credentials("alice", "topsecret"))
            .await
            .unwrap();

        let wrong_password = service
            .login(credentials("alice", "wrongsecret"))
            .await
            .unwrap_err();
        let unknown_user = service
            .login(credentials("mallory", "topsecret"))
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, AppError::InvalidCredentials));
        assert!(matches!(unknown_user, AppError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn test_unknown_user_still_runs_bcrypt() {
        let service = service();
        assert!(service.dummy_hash.get().is_none());

        let result = service.login(credentials("mallory", DUMMY_PASSWORD)).await;

        assert!(matches!(result, Err(AppError::InvalidCredentials)));
        let dummy_hash = service.dummy_hash.get().unwrap();
        assert!(dummy_hash.starts_with("$2b$04$"));
    }

    #[tokio::test]
    async fn test_garbage_token() {
        assert!(matches!(
            service().validate_token("not.a.token"),
            Err(AppError::InvalidToken(_))
        ));
    }
}
