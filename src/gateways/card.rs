//! Card-processing provider client.
//!
//! Client-credentials exchange with a fixed scope, create with the
//! amount in minor units plus a free-text customer reference, then a
//! redirect to the provider's checkout page. Verification after the
//! redirect is a read-only status query; exactly one status code means
//! paid.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use async_trait::async_trait;

use crate::config::CardProviderConfig;
use crate::errors::ServiceError;
use crate::gateways::{CreatedTransaction, PaymentGateway, Verification};
use crate::models::{BuyerContact, LineItem};

/// Scope the provider requires for checkout transactions.
const TOKEN_SCOPE: &str = "checkout.transactions";

/// The provider's one-and-only "payment completed" status code.
const STATUS_PAID: i32 = 100;

pub struct CardGateway {
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
struct CreateTransactionRequest {
    amount: i64,
    currency: String,
    customer_reference: String,
}

#[derive(Deserialize)]
struct CreateTransactionResponse {
    transaction_id: String,
    checkout_url: String,
}

#[derive(Deserialize)]
struct TransactionStatusResponse {
    status_code: i32,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    customer_email: Option<String>,
}

impl CardGateway {
    pub fn new(config: &CardProviderConfig, currency: &str, http: Client) -> Self {
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
            .post(format!("{}/oauth/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", TOKEN_SCOPE)])
            .send()
            .await
            .map_err(|e| ServiceError::ProviderAuth(format!("card token request: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ProviderAuth(format!(
                "card token exchange returned {}",
                response.status()
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ProviderAuth(format!("card token body: {}", e)))?;
        Ok(token.access_token)
    }

    /// Free-text reference carried through the provider so a human can
    /// match the transaction back to the checkout.
    fn customer_reference(items: &[LineItem], buyer: Option<&BuyerContact>) -> String {
        let first = items.first().map(|i| i.name.as_str()).unwrap_or("checkout");
        match buyer {
            Some(contact) => format!("{} ({})", first, contact.email),
            None => first.to_owned(),
        }
    }
}

#[async_trait]
impl PaymentGateway for CardGateway {
    #[instrument(skip(self, items, buyer), fields(total_cents))]
    async fn create_transaction(
        &self,
        total_cents: i64,
        items: &[LineItem],
        buyer: Option<&BuyerContact>,
    ) -> Result<CreatedTransaction, ServiceError> {
        let token = self.fetch_token().await?;
        let body = CreateTransactionRequest {
            amount: total_cents,
            currency: self.currency.clone(),
            customer_reference: Self::customer_reference(items, buyer),
        };

        let response = self
            .http
            .post(format!("{}/api/transactions", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ProviderRequest(format!("card create: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ProviderRequest(format!(
                "card create returned {}",
                response.status()
            )));
        }
        let created: CreateTransactionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ProviderRequest(format!("card create body: {}", e)))?;

        info!(provider_ref = %created.transaction_id, "Card transaction created");
        Ok(CreatedTransaction {
            provider_ref: created.transaction_id,
            approval_url: Some(created.checkout_url),
        })
    }

    #[instrument(skip(self))]
    async fn verify_transaction(&self, provider_ref: &str) -> Result<Verification, ServiceError> {
        let token = self.fetch_token().await?;
        let response = self
            .http
            .get(format!("{}/api/transactions/{}", self.base_url, provider_ref))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::ProviderVerify(format!(
                        "card status query timed out for {}; outcome unknown",
                        provider_ref
                    ))
                } else {
                    ServiceError::ProviderVerify(format!("card status query: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::ProviderVerify(format!(
                "card status query returned {}",
                response.status()
            )));
        }
        let status: TransactionStatusResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ProviderVerify(format!("card status body: {}", e)))?;

        if status.status_code != STATUS_PAID {
            warn!(
                status_code = status.status_code,
                "Card transaction not in paid state"
            );
            return Ok(Verification {
                success: false,
                confirmed_cents: None,
                payer_email: None,
            });
        }
        Ok(Verification {
            success: true,
            confirmed_cents: status.amount,
            payer_email: status.customer_email,
        })
    }
}
