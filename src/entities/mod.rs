pub mod order;
pub mod order_counter;
pub mod pending_checkout;
pub mod reconciliation_error;
