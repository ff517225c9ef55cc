//! Outbound payment-provider clients.
//!
//! Two remote paths sit behind [`PaymentGateway`]: the redirect-based
//! wallet provider and the card processor. The bank-transfer path has
//! no provider at all and is handled synchronously by the checkout
//! service.

pub mod card;
pub mod wallet;

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::ServiceError;
use crate::models::{BuyerContact, LineItem};

/// Result of creating a provider-side payment intent.
#[derive(Debug, Clone)]
pub struct CreatedTransaction {
    pub provider_ref: String,
    /// URL the buyer is redirected to for approval, where the provider
    /// uses a redirect flow.
    pub approval_url: Option<String>,
}

/// Result of a capture (wallet) or status query (card).
///
/// `success == false` is not an error: the provider reported a clean
/// non-final or failed state and no money moved.
#[derive(Debug, Clone)]
pub struct Verification {
    pub success: bool,
    pub confirmed_cents: Option<i64>,
    pub payer_email: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authenticates against the provider and creates a payment intent
    /// for the given total. The gateway computes the line-item
    /// breakdown itself so the declared total and the item sum always
    /// agree to the cent.
    async fn create_transaction(
        &self,
        total_cents: i64,
        items: &[LineItem],
        buyer: Option<&BuyerContact>,
    ) -> Result<CreatedTransaction, ServiceError>;

    /// Captures (wallet) or queries (card) the transaction. Network or
    /// provider failure is a [`ServiceError::ProviderVerify`]; the
    /// outcome is then unknown and the caller records a reconciliation
    /// entry instead of retrying blindly.
    async fn verify_transaction(&self, provider_ref: &str) -> Result<Verification, ServiceError>;
}

/// Shared client for provider calls; every outbound request carries a
/// bounded timeout so no checkout ever hangs on a provider.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ServiceError::ProviderRequest(format!("http client: {}", e)))
}

/// Renders minor units as a two-decimal amount string ("200" -> "2.00").
pub(crate) fn cents_to_amount(cents: i64) -> String {
    Decimal::new(cents, 2).to_string()
}

/// Parses a provider's two-decimal amount string back into minor units.
pub(crate) fn amount_to_cents(amount: &str) -> Option<i64> {
    use rust_decimal::prelude::ToPrimitive;
    use std::str::FromStr;
    let value = Decimal::from_str(amount).ok()?;
    (value * Decimal::new(100, 0)).to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_render_with_two_decimals() {
        assert_eq!(cents_to_amount(200), "2.00");
        assert_eq!(cents_to_amount(5), "0.05");
        assert_eq!(cents_to_amount(123456), "1234.56");
    }

    #[test]
    fn amount_parsing_round_trips() {
        assert_eq!(amount_to_cents("2.00"), Some(200));
        assert_eq!(amount_to_cents("0.05"), Some(5));
        assert_eq!(amount_to_cents("1234.56"), Some(123456));
        assert_eq!(amount_to_cents("not-a-number"), None);
    }
}
