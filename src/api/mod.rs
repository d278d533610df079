// src/api/mod.rs

//! The HTTP surface: routing, request validation and rate limiting around
//! the scan handler.

pub mod rate_limit;
pub mod scan;

use std::sync::Arc;

use axum::routing::post;
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::core::handler::ScanHandler;

use self::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<ScanHandler>,
}

/// Builds the application router. The limiter applies to every route.
pub fn router(handler: Arc<ScanHandler>, limiter: Arc<RateLimiter>) -> Router {
    Router::new()
        .route("/v1/scan", post(scan::scan_target))
        .with_state(AppState { handler })
        .layer(middleware::from_fn_with_state(limiter, rate_limit::enforce))
        .layer(TraceLayer::new_for_http())
}
