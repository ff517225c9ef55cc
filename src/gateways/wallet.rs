//! Wallet provider client (redirect-based, PayPal-style API).
//!
//! Every call performs its own client-credentials exchange; tokens are
//! not cached across requests. Capture is the money-moving step, so its
//! failures are surfaced as `ProviderVerify` and never retried here.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use async_trait::async_trait;

use crate::config::WalletProviderConfig;
use crate::errors::ServiceError;
use crate::gateways::{amount_to_cents, cents_to_amount, CreatedTransaction, PaymentGateway, Verification};
use crate::models::{BuyerContact, LineItem};

const CAPTURE_COMPLETED: &str = "COMPLETED";

pub struct WalletGateway {
    http: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    currency: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize)]
struct Amount {
    currency_code: String,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    breakdown: Option<Breakdown>,
}

#[derive(Serialize)]
struct Breakdown {
    item_total: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    discount: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    handling: Option<Money>,
}

#[derive(Serialize)]
struct Money {
    currency_code: String,
    value: String,
}

#[derive(Serialize)]
struct Item {
    name: String,
    quantity: String,
    unit_amount: Money,
}

#[derive(Serialize)]
struct PurchaseUnit {
    amount: Amount,
    items: Vec<Item>,
}

#[derive(Serialize)]
struct CreateOrderRequest {
    intent: &'static str,
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    id: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Deserialize)]
struct Link {
    rel: String,
    href: String,
}

#[derive(Deserialize)]
struct CaptureResponse {
    status: String,
    #[serde(default)]
    purchase_units: Vec<CapturedUnit>,
    #[serde(default)]
    payer: Option<Payer>,
}

#[derive(Deserialize)]
struct CapturedUnit {
    #[serde(default)]
    payments: Option<Payments>,
}

#[derive(Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Deserialize)]
struct Capture {
    amount: CapturedAmount,
}

#[derive(Deserialize)]
struct CapturedAmount {
    value: String,
}

#[derive(Deserialize)]
struct Payer {
    #[serde(default)]
    email_address: Option<String>,
}

impl WalletGateway {
    pub fn new(config: &WalletProviderConfig, currency: &str, http: Client) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            currency: currency.to_owned(),
        }
    }

    async fn fetch_token(&self) -> Result<String, ServiceError> {
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ServiceError::ProviderAuth(format!("wallet token request: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ProviderAuth(format!(
                "wallet token exchange returned {}",
                response.status()
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ProviderAuth(format!("wallet token body: {}", e)))?;
        Ok(token.access_token)
    }

    fn money(&self, cents: i64) -> Money {
        Money {
            currency_code: self.currency.clone(),
            value: cents_to_amount(cents),
        }
    }

    /// Builds a breakdown where item_total always equals the sum of the
    /// transmitted items; the gap to the authoritative total is carried
    /// as a discount (promotions) or handling line, so unit prices ×
    /// quantities and the declared total agree to the cent.
    fn purchase_unit(&self, total_cents: i64, items: &[LineItem]) -> PurchaseUnit {
        let item_sum: i64 = items.iter().map(|i| i.price_cents).sum();
        let breakdown = Breakdown {
            item_total: self.money(item_sum),
            discount: (item_sum > total_cents).then(|| self.money(item_sum - total_cents)),
            handling: (total_cents > item_sum).then(|| self.money(total_cents - item_sum)),
        };
        PurchaseUnit {
            amount: Amount {
                currency_code: self.currency.clone(),
                value: cents_to_amount(total_cents),
                breakdown: Some(breakdown),
            },
            items: items
                .iter()
                .map(|item| Item {
                    // A line is priced as one position regardless of the
                    // bundled quantity, which keeps the item math exact.
                    name: item.name.clone(),
                    quantity: "1".to_owned(),
                    unit_amount: self.money(item.price_cents),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl PaymentGateway for WalletGateway {
    #[instrument(skip(self, items, _buyer), fields(total_cents))]
    async fn create_transaction(
        &self,
        total_cents: i64,
        items: &[LineItem],
        _buyer: Option<&BuyerContact>,
    ) -> Result<CreatedTransaction, ServiceError> {
        let token = self.fetch_token().await?;
        let body = CreateOrderRequest {
            intent: "CAPTURE",
            purchase_units: vec![self.purchase_unit(total_cents, items)],
        };

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ProviderRequest(format!("wallet create: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ProviderRequest(format!(
                "wallet create returned {}",
                response.status()
            )));
        }
        let created: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ProviderRequest(format!("wallet create body: {}", e)))?;

        let approval_url = created
            .links
            .into_iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href);
        info!(provider_ref = %created.id, "Wallet transaction created");
        Ok(CreatedTransaction {
            provider_ref: created.id,
            approval_url,
        })
    }

    #[instrument(skip(self))]
    async fn verify_transaction(&self, provider_ref: &str) -> Result<Verification, ServiceError> {
        let token = self.fetch_token().await?;
        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.base_url, provider_ref
            ))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::ProviderVerify(format!(
                        "wallet capture timed out for {}; outcome unknown",
                        provider_ref
                    ))
                } else {
                    ServiceError::ProviderVerify(format!("wallet capture: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::ProviderVerify(format!(
                "wallet capture returned {}",
                response.status()
            )));
        }
        let captured: CaptureResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ProviderVerify(format!("wallet capture body: {}", e)))?;

        if captured.status != CAPTURE_COMPLETED {
            warn!(status = %captured.status, "Wallet capture did not complete");
            return Ok(Verification {
                success: false,
                confirmed_cents: None,
                payer_email: None,
            });
        }

        let confirmed_cents = captured
            .purchase_units
            .first()
            .and_then(|u| u.payments.as_ref())
            .and_then(|p| p.captures.first())
            .and_then(|c| amount_to_cents(&c.amount.value));
        Ok(Verification {
            success: true,
            confirmed_cents,
            payer_email: captured.payer.and_then(|p| p.email_address),
        })
    }
}
