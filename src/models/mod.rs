use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single purchased position. `price_cents` is the line price in minor
/// currency units (already multiplied by quantity where the storefront
/// prices per bundle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub price_cents: i64,
    /// Where the purchase is delivered to, e.g. a social profile handle.
    pub fulfillment_target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerContact {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Staged, unconfirmed checkout keyed by the payment provider's
/// transaction reference. Exists only between transaction creation and
/// materialization (or abandonment) and is never mutated in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCheckout {
    pub provider_ref: String,
    pub items: Vec<LineItem>,
    pub total_cents: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer: Option<BuyerContact>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Wallet,
    Card,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fulfillment states. Transitions are admin-driven and unrestricted;
/// the storefront never skips states on its own but does not forbid it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Bank-transfer orders awaiting the offline payment.
    PendingPayment,
    /// Payment confirmed, order received.
    Eingegangen,
    Gestartet,
    InAusfuehrung,
    Abgeschlossen,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Eingegangen => "eingegangen",
            OrderStatus::Gestartet => "gestartet",
            OrderStatus::InAusfuehrung => "in_ausfuehrung",
            OrderStatus::Abgeschlossen => "abgeschlossen",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_payment" => Some(OrderStatus::PendingPayment),
            "eingegangen" => Some(OrderStatus::Eingegangen),
            "gestartet" => Some(OrderStatus::Gestartet),
            "in_ausfuehrung" => Some(OrderStatus::InAusfuehrung),
            "abgeschlossen" => Some(OrderStatus::Abgeschlossen),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable, uniquely numbered order record.
///
/// `total_cents` is the authoritative charge amount and is never
/// recomputed from the line items; promotions can make the naive item
/// sum undercount. Legacy records imported without a stored total fall
/// back to the item sum for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_number: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub payment_method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,
    pub items: Vec<LineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cents: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer: Option<BuyerContact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Display total: the stored amount when present, otherwise the
    /// line-item sum (legacy records only).
    pub fn display_total_cents(&self) -> i64 {
        self.total_cents.unwrap_or_else(|| self.item_sum_cents())
    }

    pub fn item_sum_cents(&self) -> i64 {
        self.items.iter().map(|i| i.price_cents).sum()
    }
}

/// Order fields supplied by the caller; the repository assigns the
/// order number and timestamps when it persists the record.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub provider_ref: Option<String>,
    pub items: Vec<LineItem>,
    pub total_cents: Option<i64>,
    pub seller_note: Option<String>,
    pub buyer: Option<BuyerContact>,
}

/// Append-only diagnostic record written whenever materialization fails
/// after a provider already confirmed payment, or when a confirmation
/// arrives with no matching checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationError {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ReconciliationError {
    pub fn new(message: impl Into<String>, provider_ref: Option<String>, amount_cents: Option<i64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_ref,
            message: message.into(),
            amount_cents,
            created_at: Utc::now(),
        }
    }
}

/// Numbering scheme for human-readable order numbers:
/// `<PREFIX>-<YEAR>-<NNNN>`, four-digit zero-padded, sequence scoped to
/// the calendar year.
#[derive(Debug, Clone)]
pub struct OrderNumbering {
    pub prefix: String,
    /// First sequence value handed out in a year with no orders yet.
    pub start_sequence: u32,
}

impl OrderNumbering {
    pub fn format(&self, year: i32, sequence: u32) -> String {
        format!("{}-{}-{:04}", self.prefix, year, sequence)
    }

    /// Extracts the numeric suffix of an order number belonging to the
    /// given year; `None` for other years or foreign formats.
    pub fn sequence_of(&self, order_number: &str, year: i32) -> Option<u32> {
        let rest = order_number.strip_prefix(&self.prefix)?.strip_prefix('-')?;
        let (num_year, seq) = rest.split_once('-')?;
        if num_year.parse::<i32>().ok()? != year {
            return None;
        }
        seq.parse().ok()
    }

    /// Next sequence for `year` given every already-issued number plus a
    /// persisted high-water mark. Taking the max of both keeps numbers
    /// strictly increasing even after the highest order was deleted.
    pub fn next_sequence<'a, I>(&self, existing: I, high_water: Option<u32>, year: i32) -> u32
    where
        I: IntoIterator<Item = &'a str>,
    {
        let max_existing = existing
            .into_iter()
            .filter_map(|n| self.sequence_of(n, year))
            .max();
        match max_existing.max(high_water) {
            Some(max) => max + 1,
            None => self.start_sequence,
        }
    }
}

impl Default for OrderNumbering {
    fn default() -> Self {
        Self {
            prefix: "ORD".to_string(),
            start_sequence: 1,
        }
    }
}
