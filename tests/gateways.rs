//! Provider clients against mocked HTTP endpoints.

use assert_matches::assert_matches;
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use storefront_api::config::{CardProviderConfig, WalletProviderConfig};
use storefront_api::errors::ServiceError;
use storefront_api::gateways::{card::CardGateway, http_client, wallet::WalletGateway, PaymentGateway};
use storefront_api::models::LineItem;

fn items(prices: &[i64]) -> Vec<LineItem> {
    prices
        .iter()
        .enumerate()
        .map(|(i, &price_cents)| LineItem {
            product_id: format!("SKU-{}", i),
            name: format!("Artikel {}", i),
            quantity: 1,
            price_cents,
            fulfillment_target: "versand@example.com".into(),
        })
        .collect()
}

fn wallet(server: &MockServer) -> WalletGateway {
    WalletGateway::new(
        &WalletProviderConfig {
            base_url: server.uri(),
            client_id: "wallet-client".into(),
            client_secret: "wallet-secret".into(),
        },
        "EUR",
        http_client(5).unwrap(),
    )
}

fn card(server: &MockServer) -> CardGateway {
    CardGateway::new(
        &CardProviderConfig {
            base_url: server.uri(),
            client_id: "card-client".into(),
            client_secret: "card-secret".into(),
        },
        "EUR",
        http_client(5).unwrap(),
    )
}

async fn mount_wallet_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "wallet-token",
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

async fn mount_card_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("scope=checkout.transactions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "card-token"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn wallet_create_sends_consistent_breakdown_and_returns_approval_url() {
    let server = MockServer::start().await;
    mount_wallet_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "WPAY-1",
            "links": [
                { "rel": "self", "href": "https://wallet.test/orders/WPAY-1" },
                { "rel": "approve", "href": "https://wallet.test/approve/WPAY-1" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = wallet(&server);
    // Item sum 30.00 against a declared total of 25.00.
    let created = gateway
        .create_transaction(2_500, &items(&[1_000, 2_000]), None)
        .await
        .unwrap();
    assert_eq!(created.provider_ref, "WPAY-1");
    assert_eq!(
        created.approval_url.as_deref(),
        Some("https://wallet.test/approve/WPAY-1")
    );

    let requests = server.received_requests().await.unwrap();
    let create_request: &Request = requests
        .iter()
        .find(|r| r.url.path() == "/v2/checkout/orders")
        .unwrap();
    let body: Value = serde_json::from_slice(&create_request.body).unwrap();
    let unit = &body["purchase_units"][0];
    assert_eq!(unit["amount"]["value"], "25.00");
    assert_eq!(unit["amount"]["breakdown"]["item_total"]["value"], "30.00");
    // The gap to the item sum is declared as a discount, so the math
    // adds up to the cent.
    assert_eq!(unit["amount"]["breakdown"]["discount"]["value"], "5.00");
    assert!(unit["amount"]["breakdown"].get("handling").is_none());
    assert_eq!(unit["items"][0]["quantity"], "1");
    assert_eq!(unit["items"][0]["unit_amount"]["value"], "10.00");
}

#[tokio::test]
async fn wallet_declares_handling_when_total_exceeds_item_sum() {
    let server = MockServer::start().await;
    mount_wallet_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "WPAY-2" })))
        .mount(&server)
        .await;

    let gateway = wallet(&server);
    gateway
        .create_transaction(1_250, &items(&[1_000]), None)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let create_request = requests
        .iter()
        .find(|r| r.url.path() == "/v2/checkout/orders")
        .unwrap();
    let body: Value = serde_json::from_slice(&create_request.body).unwrap();
    let breakdown = &body["purchase_units"][0]["amount"]["breakdown"];
    assert_eq!(breakdown["handling"]["value"], "2.50");
    assert!(breakdown.get("discount").is_none());
}

#[tokio::test]
async fn wallet_capture_completed_reports_amount_and_payer() {
    let server = MockServer::start().await;
    mount_wallet_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/WPAY-3/capture"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "status": "COMPLETED",
            "payer": { "email_address": "payer@example.com" },
            "purchase_units": [{
                "payments": { "captures": [{ "amount": { "currency_code": "EUR", "value": "25.00" } }] }
            }]
        })))
        .mount(&server)
        .await;

    let verification = wallet(&server).verify_transaction("WPAY-3").await.unwrap();
    assert!(verification.success);
    assert_eq!(verification.confirmed_cents, Some(2_500));
    assert_eq!(verification.payer_email.as_deref(), Some("payer@example.com"));
}

#[tokio::test]
async fn wallet_non_final_capture_state_is_not_success_and_not_an_error() {
    let server = MockServer::start().await;
    mount_wallet_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/WPAY-4/capture"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "status": "PENDING"
        })))
        .mount(&server)
        .await;

    let verification = wallet(&server).verify_transaction("WPAY-4").await.unwrap();
    assert!(!verification.success);
    assert_eq!(verification.confirmed_cents, None);
}

#[tokio::test]
async fn wallet_capture_http_failure_is_a_verify_error() {
    let server = MockServer::start().await;
    mount_wallet_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/WPAY-5/capture"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = wallet(&server).verify_transaction("WPAY-5").await.unwrap_err();
    assert_matches!(err, ServiceError::ProviderVerify(_));
}

#[tokio::test]
async fn wallet_token_rejection_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = wallet(&server)
        .create_transaction(1_000, &items(&[1_000]), None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ProviderAuth(_));
}

#[tokio::test]
async fn card_create_sends_minor_units_and_returns_checkout_url() {
    let server = MockServer::start().await;
    mount_card_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/transactions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "transaction_id": "CARD-1",
            "checkout_url": "https://card.test/pay/CARD-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = card(&server)
        .create_transaction(4_990, &items(&[4_990]), None)
        .await
        .unwrap();
    assert_eq!(created.provider_ref, "CARD-1");
    assert_eq!(
        created.approval_url.as_deref(),
        Some("https://card.test/pay/CARD-1")
    );

    let requests = server.received_requests().await.unwrap();
    let create_request = requests
        .iter()
        .find(|r| r.url.path() == "/api/transactions")
        .unwrap();
    let body: Value = serde_json::from_slice(&create_request.body).unwrap();
    assert_eq!(body["amount"], 4_990);
    assert_eq!(body["currency"], "EUR");
}

#[tokio::test]
async fn card_status_100_is_the_only_paid_state() {
    let server = MockServer::start().await;
    mount_card_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/transactions/CARD-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status_code": 100,
            "amount": 4_990,
            "customer_email": "buyer@example.com"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/transactions/CARD-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status_code": 90
        })))
        .mount(&server)
        .await;

    let gateway = card(&server);
    let paid = gateway.verify_transaction("CARD-2").await.unwrap();
    assert!(paid.success);
    assert_eq!(paid.confirmed_cents, Some(4_990));

    let open = gateway.verify_transaction("CARD-3").await.unwrap();
    assert!(!open.success);
}

#[tokio::test]
async fn card_status_query_failure_is_a_verify_error() {
    let server = MockServer::start().await;
    mount_card_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/transactions/CARD-4"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = card(&server).verify_transaction("CARD-4").await.unwrap_err();
    assert_matches!(err, ServiceError::ProviderVerify(_));
}
