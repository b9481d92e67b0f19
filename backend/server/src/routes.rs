use std::{any::Any, sync::Arc};

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use crate::{
    auth::{Account, CredentialsRequest, Session},
    error::{AppError, ErrorBody, ErrorDetail, INTERNAL_MESSAGE},
    gate::AuthUser,
    persistence::{self, SaveStateRequest},
    state::AppState,
    utils::JsonBody,
};

#[derive(Serialize)]
pub struct SessionResponse {
    pub message: &'static str,
    pub token: String,
    pub user: Account,
}

impl SessionResponse {
    fn new(message: &'static str, session: Session) -> Self {
        Self {
            message,
            token: session.token,
            user: session.user,
        }
    }
}

#[derive(Serialize)]
pub struct SavedResponse {
    pub message: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<CredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.identity.register(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse::new("User registered successfully", session)),
    ))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<CredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.identity.login(payload).await?;

    Ok(Json(SessionResponse::new("Login successful", session)))
}

pub async fn save_state_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    JsonBody(payload): JsonBody<SaveStateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let timestamp = persistence::save_state(state.store.as_ref(), user.user_id(), payload).await?;

    Ok(Json(SavedResponse {
        message: "State saved successfully",
        timestamp,
    }))
}

pub async fn load_state_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = persistence::load_state(state.store.as_ref(), user.user_id()).await?;

    Ok(Json(snapshot))
}

pub async fn delete_state_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    persistence::delete_state(state.store.as_ref(), user.user_id()).await?;

    Ok(Json(MessageResponse {
        message: "State deleted successfully",
    }))
}

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
    })
}

pub async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(ErrorBody::new("Not found")))
}

pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let reason = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    error!("Handler panicked: {reason}");

    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new(INTERNAL_MESSAGE)),
    )
        .into_response();
    response
        .extensions_mut()
        .insert(ErrorDetail(format!("Handler panicked: {reason}")));

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_response_carries_reason() {
        let response = panic_response(Box::new("state lock poisoned"));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = response.extensions().get::<ErrorDetail>().cloned();
        assert_eq!(
            detail.map(|d| d.0),
            Some("Handler panicked: state lock poisoned".to_string())
        );
    }
}
