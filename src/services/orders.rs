//! Administrative order management: listing, status transitions,
//! remarks, hard deletes, and the reconciliation-error view.

use tracing::{info, instrument, warn};

use crate::errors::ServiceError;
use crate::models::{Order, OrderStatus, ReconciliationError};
use crate::storage::Storage;

pub struct OrderAdminService {
    storage: Storage,
}

impl OrderAdminService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// All orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<Order>, ServiceError> {
        Ok(self.storage.orders.list().await?)
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_number: &str) -> Result<Order, ServiceError> {
        self.storage
            .orders
            .find_by_number(order_number)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_number)))
    }

    /// Transitions an order to any status. Returns `None` when the
    /// order number does not resolve; callers render that as not-found
    /// rather than an error. Remarks are only replaced when supplied.
    #[instrument(skip(self, remarks))]
    pub async fn update_status(
        &self,
        order_number: &str,
        status: OrderStatus,
        remarks: Option<String>,
    ) -> Result<Option<Order>, ServiceError> {
        let updated = self
            .storage
            .orders
            .update_status(order_number, status, remarks)
            .await?;
        match &updated {
            Some(order) => {
                info!(order_number = %order.order_number, status = %order.status, "Order status updated")
            }
            None => warn!(order_number, "Status update for unknown order ignored"),
        }
        Ok(updated)
    }

    /// Hard delete, irreversible. Returns whether a record was removed.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, order_number: &str) -> Result<bool, ServiceError> {
        let removed = self.storage.orders.delete(order_number).await?;
        if removed {
            info!(order_number, "Order deleted");
        }
        Ok(removed)
    }

    /// Reconciliation entries, newest first. Admin-only visibility.
    #[instrument(skip(self))]
    pub async fn list_reconciliation_errors(
        &self,
    ) -> Result<Vec<ReconciliationError>, ServiceError> {
        Ok(self.storage.errors.list().await?)
    }
}
