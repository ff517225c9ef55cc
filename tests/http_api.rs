//! HTTP surface: routing, admin auth and error rendering.

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use storefront_api::config::AppConfig;
use storefront_api::models::OrderNumbering;
use storefront_api::notifications::NoopDispatcher;
use storefront_api::services::{checkout::CheckoutService, orders::OrderAdminService};
use storefront_api::storage::{file::FileStore, Storage};
use storefront_api::{app_router, AppState};

const ADMIN_TOKEN: &str = "test-admin-token";

async fn test_app(dir: &TempDir) -> Router {
    let store = Arc::new(
        FileStore::open(
            dir.path(),
            OrderNumbering {
                prefix: "BS".into(),
                start_sequence: 1,
            },
        )
        .await
        .unwrap(),
    );
    let storage = Storage {
        pending: store.clone(),
        orders: store.clone(),
        errors: store,
    };

    let config = AppConfig {
        admin_token: Some(ADMIN_TOKEN.into()),
        ..AppConfig::default()
    };

    let checkout = Arc::new(CheckoutService::new(
        storage.clone(),
        None,
        None,
        Arc::new(NoopDispatcher),
    ));
    let orders = Arc::new(OrderAdminService::new(storage));

    app_router(AppState {
        config,
        checkout,
        orders,
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn bank_transfer_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/checkout/bank-transfer")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "items": [{
                    "product_id": "SKU-7",
                    "name": "Filterkaffee",
                    "quantity": 1,
                    "price_cents": 1500,
                    "fulfillment_target": "versand@example.com"
                }],
                "total_cents": 1500
            })
            .to_string(),
        ))
        .unwrap()
}

fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn admin_routes_reject_missing_or_wrong_token() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let no_token = app
        .clone()
        .oneshot(
            Request::get("/api/v1/admin/orders")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(no_token.status(), StatusCode::UNAUTHORIZED);

    let wrong_token = app
        .oneshot(
            Request::get("/api/v1/admin/orders")
                .header(header::AUTHORIZATION, "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong_token.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bank_transfer_order_shows_up_in_admin_listing() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let created = app
        .clone()
        .oneshot(bank_transfer_request())
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = body_json(created).await;
    assert_eq!(created["status"], "pending_payment");
    assert_eq!(created["payment_method"], "bank_transfer");
    let order_number = created["order_number"].as_str().unwrap().to_owned();

    let listing = app
        .clone()
        .oneshot(admin_get("/api/v1/admin/orders"))
        .await
        .unwrap();
    assert_eq!(listing.status(), StatusCode::OK);
    let listing = body_json(listing).await;
    assert_eq!(listing.as_array().unwrap().len(), 1);
    assert_eq!(listing[0]["order_number"], order_number.as_str());

    let fetched = app
        .oneshot(admin_get(&format!("/api/v1/admin/orders/{}", order_number)))
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(body_json(fetched).await["total_cents"], 1500);
}

#[tokio::test]
async fn status_update_validates_status_and_404s_unknown_orders() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let created = app
        .clone()
        .oneshot(bank_transfer_request())
        .await
        .unwrap();
    let order_number = body_json(created).await["order_number"]
        .as_str()
        .unwrap()
        .to_owned();

    let update = |number: &str, status: &str| {
        Request::builder()
            .method("PUT")
            .uri(format!("/api/v1/admin/orders/{}/status", number))
            .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "status": status }).to_string()))
            .unwrap()
    };

    let bad_status = app
        .clone()
        .oneshot(update(&order_number, "verschollen"))
        .await
        .unwrap();
    assert_eq!(bad_status.status(), StatusCode::BAD_REQUEST);

    let missing = app
        .clone()
        .oneshot(update("BS-1999-0001", "abgeschlossen"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let updated = app
        .oneshot(update(&order_number, "abgeschlossen"))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(body_json(updated).await["status"], "abgeschlossen");
}

#[tokio::test]
async fn delete_returns_flag_then_404_on_repeat() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let created = app
        .clone()
        .oneshot(bank_transfer_request())
        .await
        .unwrap();
    let order_number = body_json(created).await["order_number"]
        .as_str()
        .unwrap()
        .to_owned();

    let delete = |number: &str| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/admin/orders/{}", number))
            .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(delete(&order_number)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(body_json(first).await["deleted"], true);

    let second = app.oneshot(delete(&order_number)).await.unwrap();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_checkout_payload_is_a_400_with_error_body() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/checkout/bank-transfer")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "items": [], "total_cents": 0 }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].is_string());
    assert!(body["message"].is_string());
}
