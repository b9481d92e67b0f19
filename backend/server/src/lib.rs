//! Backend for the political simulator on the portfolio site.
//!
//! Users register or log in, get a signed bearer token, and use it to save,
//! load and delete one simulator state (`parties` + `parliament`) tied to
//! their account.
//!
//!
//!
//! # Routes
//!
//! | Route | Auth | Notes |
//! |---|---|---|
//! | `POST /api/auth/register` | none | 201 with token, 409 if the username is taken |
//! | `POST /api/auth/login` | none | 401 with the same message for unknown user or wrong password |
//! | `POST /api/state` | bearer | upsert, last write wins |
//! | `GET /api/state` | bearer | empty default when nothing was saved |
//! | `DELETE /api/state` | bearer | idempotent |
//! | `GET /api/health` | none | |
//!
//! Missing token is a 401, a bad or expired one a 403. Errors always come back
//! as `{ "error": ..., "details": [...] }`.
//!
//!
//!
//! # Flow
//!
//! - Register/login go straight to [`auth::IdentityService`]
//! - State routes pass through [`gate::AuthUser`] first, which validates the token
//!   without touching the database
//! - [`persistence`] checks the payload shape and talks to the [`store::Store`]
//!
//!
//!
//! # Notes
//!
//! ## Tokens
//! Stateless HS256 JWTs, nothing to look up per request. The catch is there is no
//! way to revoke one early, a token is good until it expires (`JWT_EXPIRES_IN`).
//!
//! ## State blobs
//! The simulator owns the structure of parties and factions. We only check that
//! the top level has the right shape and store both as JSON text, so the frontend
//! can evolve without backend changes.
//!
//!
//!
//! # Setup
//!
//! Run against a local MySQL.
//! ```sh
//! JWT_SECRET=dev DB_PASSWORD=dev RUST_LOG=info cargo run --bin polsim
//! ```
//!
//! Run without a database, everything is lost on restart.
//! ```sh
//! JWT_SECRET=dev STORE_BACKEND=memory APP_ENV=development RUST_LOG=debug cargo run --bin polsim
//! ```
//!
//! Secrets (`JWT_SECRET`, `DB_PASSWORD`) are read from `/run/secrets/` first.
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::map_response_with_state,
    routing::{get, post},
};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod gate;
pub mod password;
pub mod persistence;
pub mod routes;
pub mod state;
pub mod store;
pub mod token;
pub mod utils;

use error::reveal_error_detail;
use routes::{
    delete_state_handler, health_handler, load_state_handler, login_handler, not_found_handler,
    panic_response, register_handler, save_state_handler,
};
use state::AppState;
use utils::cors_layer;

pub fn build_router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config)?;

    let api = Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route(
            "/state",
            get(load_state_handler)
                .post(save_state_handler)
                .delete(delete_state_handler),
        )
        .route("/health", get(health_handler));

    Ok(Router::new()
        .nest("/api", api)
        .fallback(not_found_handler)
        // Inside the detail layer so panics get the dev-mode diagnostic too.
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(map_response_with_state(state.clone(), reveal_error_detail))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await?;

    info!("Starting server...");
    let app = build_router(state.clone())?;

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!(
        "Server running on {address} ({:?}, frontend {})",
        state.config.environment, state.config.frontend_url
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    state.store.close().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
