//! Storefront API Library
//!
//! Checkout, payment confirmation and order administration for the
//! storefront backend.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod entities;
pub mod errors;
pub mod gateways;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod notifications;
pub mod services;
pub mod storage;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use services::checkout::CheckoutService;
use services::orders::OrderAdminService;

#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderAdminService>,
}

/// Buyer-facing checkout routes.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/wallet", post(handlers::checkout::begin_wallet))
        .route("/wallet/capture", post(handlers::checkout::capture_wallet))
        .route("/card", post(handlers::checkout::begin_card))
        .route("/card/confirm", get(handlers::checkout::confirm_card))
        .route(
            "/bank-transfer",
            post(handlers::checkout::submit_bank_transfer),
        )
}

/// Admin routes, guarded by the shared-secret bearer middleware.
pub fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route(
            "/orders/:order_number",
            get(handlers::orders::get_order).delete(handlers::orders::delete_order),
        )
        .route(
            "/orders/:order_number/status",
            put(handlers::orders::update_status),
        )
        .route(
            "/reconciliation-errors",
            get(handlers::orders::list_reconciliation_errors),
        )
        .route_layer(middleware::from_fn_with_state(
            state,
            handlers::admin_auth,
        ))
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1/checkout", checkout_routes())
        .nest("/api/v1/admin", admin_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
