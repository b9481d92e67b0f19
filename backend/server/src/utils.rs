use std::time::Duration;

use axum::{
    Json,
    extract::FromRequest,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue, InvalidHeaderValue},
    },
};
use tower_http::cors::CorsLayer;

use crate::{config::Config, error::AppError};

/// `Json` extractor whose rejections come back as validation errors in the
/// usual error body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

pub fn cors_layer(config: &Config) -> Result<CorsLayer, InvalidHeaderValue> {
    Ok(CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&config.frontend_url)?)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60)))
}
