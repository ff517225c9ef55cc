//! Best-effort order notifications.
//!
//! After materialization the buyer and the merchant each get a mail;
//! both calls are fire-and-forget. Losing a confirmation mail must
//! never be conflated with losing an order, so dispatch runs detached
//! from the materializing request and failures only show up in logs.

use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use async_trait::async_trait;

use crate::config::MailRelayConfig;
use crate::models::Order;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("mail relay error: {0}")]
    Relay(String),
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify_buyer(&self, order: &Order) -> Result<(), NotificationError>;
    async fn notify_merchant(&self, order: &Order) -> Result<(), NotificationError>;
}

/// Spawns both notifications as detached tasks and returns immediately.
/// Outcomes are logged and discarded.
pub fn dispatch_order_notifications(dispatcher: Arc<dyn NotificationDispatcher>, order: Order) {
    let order_number = order.order_number.clone();
    tokio::spawn(async move {
        if let Err(err) = dispatcher.notify_buyer(&order).await {
            warn!(order_number = %order.order_number, error = %err, "Buyer notification failed");
        }
        if let Err(err) = dispatcher.notify_merchant(&order).await {
            warn!(order_number = %order.order_number, error = %err, "Merchant notification failed");
        }
    });
    debug!(order_number = %order_number, "Order notifications dispatched");
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    from: &'a str,
    subject: String,
    body: String,
}

/// Posts rendered order summaries to a mail-relay HTTP endpoint.
pub struct MailRelayDispatcher {
    http: Client,
    config: MailRelayConfig,
}

impl MailRelayDispatcher {
    pub fn new(config: MailRelayConfig, http: Client) -> Self {
        Self { http, config }
    }

    fn render_summary(order: &Order) -> String {
        use std::fmt::Write;
        let mut body = format!(
            "Order {} ({})\nStatus: {}\n\nItems:\n",
            order.order_number, order.payment_method, order.status
        );
        for item in &order.items {
            let _ = writeln!(
                body,
                "- {} x{} -> {} ({} cents)",
                item.name, item.quantity, item.fulfillment_target, item.price_cents
            );
        }
        let _ = writeln!(body, "\nTotal: {} cents", order.display_total_cents());
        if let Some(note) = &order.seller_note {
            let _ = writeln!(body, "Note: {}", note);
        }
        body
    }

    async fn send(&self, to: &str, subject: String, order: &Order) -> Result<(), NotificationError> {
        let message = RelayMessage {
            to,
            from: &self.config.sender_email,
            subject,
            body: Self::render_summary(order),
        };
        let response = self
            .http
            .post(&self.config.endpoint)
            .json(&message)
            .send()
            .await
            .map_err(|e| NotificationError::Relay(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotificationError::Relay(format!(
                "relay returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for MailRelayDispatcher {
    async fn notify_buyer(&self, order: &Order) -> Result<(), NotificationError> {
        let Some(buyer) = &order.buyer else {
            // Nothing to send without a buyer contact.
            return Ok(());
        };
        self.send(
            &buyer.email,
            format!("Your order {}", order.order_number),
            order,
        )
        .await
    }

    async fn notify_merchant(&self, order: &Order) -> Result<(), NotificationError> {
        self.send(
            &self.config.merchant_email,
            format!("New order {}", order.order_number),
            order,
        )
        .await
    }
}

/// Dispatcher for deployments without a configured mail relay and for
/// tests; accepts everything and sends nothing.
#[derive(Default)]
pub struct NoopDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopDispatcher {
    async fn notify_buyer(&self, _order: &Order) -> Result<(), NotificationError> {
        Ok(())
    }

    async fn notify_merchant(&self, _order: &Order) -> Result<(), NotificationError> {
        Ok(())
    }
}
