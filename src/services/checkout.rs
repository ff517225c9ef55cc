//! Checkout flows and the order materializer.
//!
//! Materialization is the one state transition that turns money-bearing
//! provider confirmations into durable orders, so everything after a
//! provider said "paid" either produces an order or a reconciliation
//! entry; nothing is silently dropped.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::errors::ServiceError;
use crate::gateways::PaymentGateway;
use crate::models::{
    BuyerContact, LineItem, NewOrder, Order, OrderStatus, PaymentMethod, PendingCheckout,
    ReconciliationError,
};
use crate::notifications::{dispatch_order_notifications, NotificationDispatcher};
use crate::storage::Storage;

/// A cart as submitted by the storefront.
#[derive(Debug, Clone)]
pub struct Cart {
    pub items: Vec<LineItem>,
    pub total_cents: i64,
    pub seller_note: Option<String>,
    pub buyer: Option<BuyerContact>,
}

/// Result of starting a remote-provider checkout.
#[derive(Debug, Clone)]
pub struct BegunCheckout {
    pub provider_ref: String,
    /// Redirect target for providers with an approval step.
    pub approval_url: Option<String>,
}

/// Result of a materialization attempt.
#[derive(Debug, Clone)]
pub enum MaterializeOutcome {
    Created(Order),
    /// The reference was already consumed by an earlier confirmation;
    /// duplicate webhooks and double form-submits land here and are a
    /// success-equivalent no-op.
    AlreadyProcessed(Order),
}

impl MaterializeOutcome {
    pub fn order(&self) -> &Order {
        match self {
            MaterializeOutcome::Created(order) => order,
            MaterializeOutcome::AlreadyProcessed(order) => order,
        }
    }
}

pub struct CheckoutService {
    storage: Storage,
    wallet: Option<Arc<dyn PaymentGateway>>,
    card: Option<Arc<dyn PaymentGateway>>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    /// Serializes materialization so two confirmations for the same
    /// reference cannot interleave between pending lookup and removal.
    materialize_lock: Mutex<()>,
}

impl CheckoutService {
    pub fn new(
        storage: Storage,
        wallet: Option<Arc<dyn PaymentGateway>>,
        card: Option<Arc<dyn PaymentGateway>>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            storage,
            wallet,
            card,
            dispatcher,
            materialize_lock: Mutex::new(()),
        }
    }

    fn wallet_gateway(&self) -> Result<&Arc<dyn PaymentGateway>, ServiceError> {
        self.wallet
            .as_ref()
            .ok_or_else(|| ServiceError::ProviderAuth("wallet provider is not configured".into()))
    }

    fn card_gateway(&self) -> Result<&Arc<dyn PaymentGateway>, ServiceError> {
        self.card
            .as_ref()
            .ok_or_else(|| ServiceError::ProviderAuth("card provider is not configured".into()))
    }

    fn validate_cart(cart: &Cart) -> Result<(), ServiceError> {
        if cart.items.is_empty() {
            return Err(ServiceError::Validation("cart has no items".into()));
        }
        if cart.total_cents <= 0 {
            return Err(ServiceError::Validation("total must be positive".into()));
        }
        if cart.items.iter().any(|i| i.quantity == 0) {
            return Err(ServiceError::Validation(
                "line item quantity must be positive".into(),
            ));
        }
        if cart.items.iter().any(|i| i.price_cents < 0) {
            return Err(ServiceError::Validation(
                "line item price must not be negative".into(),
            ));
        }
        if let Some(buyer) = &cart.buyer {
            if buyer.email.trim().is_empty() {
                return Err(ServiceError::Validation("buyer email is required".into()));
            }
        }
        Ok(())
    }

    /// Creates a wallet transaction and stages the checkout. Nothing
    /// has been charged yet; the buyer is redirected to approve.
    #[instrument(skip(self, cart), fields(total_cents = cart.total_cents))]
    pub async fn begin_wallet_checkout(&self, cart: Cart) -> Result<BegunCheckout, ServiceError> {
        self.begin_remote_checkout(cart, PaymentMethod::Wallet).await
    }

    /// Creates a card transaction and stages the checkout.
    #[instrument(skip(self, cart), fields(total_cents = cart.total_cents))]
    pub async fn begin_card_checkout(&self, cart: Cart) -> Result<BegunCheckout, ServiceError> {
        self.begin_remote_checkout(cart, PaymentMethod::Card).await
    }

    async fn begin_remote_checkout(
        &self,
        cart: Cart,
        method: PaymentMethod,
    ) -> Result<BegunCheckout, ServiceError> {
        Self::validate_cart(&cart)?;
        let gateway = match method {
            PaymentMethod::Wallet => self.wallet_gateway()?,
            PaymentMethod::Card => self.card_gateway()?,
            PaymentMethod::BankTransfer => {
                return Err(ServiceError::Validation(
                    "bank transfer has no remote provider".into(),
                ))
            }
        };

        let created = gateway
            .create_transaction(cart.total_cents, &cart.items, cart.buyer.as_ref())
            .await?;

        self.storage
            .pending
            .put(PendingCheckout {
                provider_ref: created.provider_ref.clone(),
                items: cart.items,
                total_cents: cart.total_cents,
                seller_note: cart.seller_note,
                buyer: cart.buyer,
                created_at: chrono::Utc::now(),
            })
            .await?;

        info!(provider_ref = %created.provider_ref, method = %method, "Checkout staged");
        Ok(BegunCheckout {
            provider_ref: created.provider_ref,
            approval_url: created.approval_url,
        })
    }

    /// Bank transfers have no provider confirmation to await: the order
    /// is created synchronously in `pending_payment`, without a pending
    /// checkout.
    #[instrument(skip(self, cart), fields(total_cents = cart.total_cents))]
    pub async fn submit_bank_transfer(&self, cart: Cart) -> Result<Order, ServiceError> {
        Self::validate_cart(&cart)?;
        let order = self
            .storage
            .orders
            .insert_numbered(NewOrder {
                status: OrderStatus::PendingPayment,
                payment_method: PaymentMethod::BankTransfer,
                provider_ref: None,
                items: cart.items,
                total_cents: Some(cart.total_cents),
                seller_note: cart.seller_note,
                buyer: cart.buyer,
            })
            .await?;

        info!(order_number = %order.order_number, "Bank-transfer order created");
        dispatch_order_notifications(self.dispatcher.clone(), order.clone());
        Ok(order)
    }

    /// Captures the wallet transaction (the money-moving step) and
    /// materializes the order.
    #[instrument(skip(self))]
    pub async fn capture_wallet(
        &self,
        provider_ref: &str,
    ) -> Result<MaterializeOutcome, ServiceError> {
        let gateway = self.wallet_gateway()?.clone();
        self.confirm_with_gateway(&gateway, provider_ref, PaymentMethod::Wallet)
            .await
    }

    /// Verifies the card transaction after the provider redirect and
    /// materializes the order.
    #[instrument(skip(self))]
    pub async fn confirm_card(
        &self,
        provider_ref: &str,
    ) -> Result<MaterializeOutcome, ServiceError> {
        let gateway = self.card_gateway()?.clone();
        self.confirm_with_gateway(&gateway, provider_ref, PaymentMethod::Card)
            .await
    }

    async fn confirm_with_gateway(
        &self,
        gateway: &Arc<dyn PaymentGateway>,
        provider_ref: &str,
        method: PaymentMethod,
    ) -> Result<MaterializeOutcome, ServiceError> {
        let verification = match gateway.verify_transaction(provider_ref).await {
            Ok(v) => v,
            Err(err @ ServiceError::ProviderVerify(_)) => {
                // Unknown outcome: the capture may have gone through.
                // Record it for manual reconciliation, never blind-retry.
                let amount = match self.storage.pending.get(provider_ref).await {
                    Ok(pending) => pending.map(|p| p.total_cents),
                    Err(_) => None,
                };
                self.record_reconciliation(
                    format!("{} verification failed with unknown outcome: {}", method, err),
                    Some(provider_ref),
                    amount,
                )
                .await;
                return Err(err);
            }
            Err(other) => return Err(other),
        };

        if !verification.success {
            // Clean failure at the provider; the staged checkout stays
            // so the buyer can retry approval.
            return Err(ServiceError::PaymentNotCompleted(format!(
                "provider reported a non-final state for {}",
                provider_ref
            )));
        }

        self.materialize(provider_ref, method, verification.confirmed_cents)
            .await
    }

    /// Turns a confirmed pending checkout into a durable order:
    /// look up the staged snapshot, allocate the next order number and
    /// write the order, drop the staged snapshot, then notify.
    #[instrument(skip(self))]
    pub async fn materialize(
        &self,
        provider_ref: &str,
        method: PaymentMethod,
        confirmed_cents: Option<i64>,
    ) -> Result<MaterializeOutcome, ServiceError> {
        let _guard = self.materialize_lock.lock().await;

        let pending = match self.storage.pending.get(provider_ref).await {
            Ok(pending) => pending,
            Err(err) => {
                self.record_reconciliation(
                    format!("pending checkout lookup failed after payment confirmation: {}", err),
                    Some(provider_ref),
                    confirmed_cents,
                )
                .await;
                return Err(ServiceError::OrderPersistence {
                    provider_ref: provider_ref.to_owned(),
                });
            }
        };

        let Some(pending) = pending else {
            // Disambiguate "already consumed" from "never existed"
            // before treating this as an error.
            return match self.storage.orders.find_by_provider_ref(provider_ref).await {
                Ok(Some(order)) => {
                    info!(
                        order_number = %order.order_number,
                        "Duplicate confirmation for an already materialized order; no-op"
                    );
                    Ok(MaterializeOutcome::AlreadyProcessed(order))
                }
                Ok(None) => {
                    self.record_reconciliation(
                        "no matching pending checkout for confirmed payment".to_owned(),
                        Some(provider_ref),
                        confirmed_cents,
                    )
                    .await;
                    Err(ServiceError::CheckoutNotFound(provider_ref.to_owned()))
                }
                Err(err) => {
                    self.record_reconciliation(
                        format!("order lookup failed after payment confirmation: {}", err),
                        Some(provider_ref),
                        confirmed_cents,
                    )
                    .await;
                    Err(ServiceError::OrderPersistence {
                        provider_ref: provider_ref.to_owned(),
                    })
                }
            };
        };

        if let Some(confirmed) = confirmed_cents {
            if confirmed != pending.total_cents {
                warn!(
                    confirmed_cents = confirmed,
                    staged_cents = pending.total_cents,
                    "Provider confirmed a different amount than staged"
                );
            }
        }

        let order = match self
            .storage
            .orders
            .insert_numbered(NewOrder {
                status: OrderStatus::Eingegangen,
                payment_method: method,
                provider_ref: Some(provider_ref.to_owned()),
                items: pending.items.clone(),
                total_cents: Some(pending.total_cents),
                seller_note: pending.seller_note.clone(),
                buyer: pending.buyer.clone(),
            })
            .await
        {
            Ok(order) => order,
            Err(err) => {
                // The pending checkout is preserved so an operator can
                // replay it; the reconciliation entry is their signal.
                error!(
                    provider_ref,
                    error = %err,
                    "Order persistence failed after payment confirmation"
                );
                self.record_reconciliation(
                    format!("order could not be persisted for confirmed payment: {}", err),
                    Some(provider_ref),
                    Some(pending.total_cents),
                )
                .await;
                return Err(ServiceError::OrderPersistence {
                    provider_ref: provider_ref.to_owned(),
                });
            }
        };

        if let Err(err) = self.storage.pending.remove(provider_ref).await {
            // The order exists; a stale staged row must not fail the
            // checkout, but it needs an operator's eye.
            error!(provider_ref, error = %err, "Pending checkout removal failed after materialization");
            self.record_reconciliation(
                format!("pending checkout not removed after materialization: {}", err),
                Some(provider_ref),
                Some(pending.total_cents),
            )
            .await;
        }

        info!(
            order_number = %order.order_number,
            provider_ref,
            total_cents = pending.total_cents,
            "Checkout materialized into order"
        );
        dispatch_order_notifications(self.dispatcher.clone(), order.clone());
        Ok(MaterializeOutcome::Created(order))
    }

    /// Best-effort append; failures here are logged only, since this
    /// already runs on failure paths.
    async fn record_reconciliation(
        &self,
        message: String,
        provider_ref: Option<&str>,
        amount_cents: Option<i64>,
    ) {
        let entry = ReconciliationError::new(message, provider_ref.map(ToOwned::to_owned), amount_cents);
        if let Err(err) = self.storage.errors.append(entry).await {
            error!(error = %err, "Failed to append reconciliation entry");
        }
    }
}
