//! Persistence for the three record families: pending checkouts, orders
//! and reconciliation errors.
//!
//! Two interchangeable backends exist (JSON files, sea-orm database);
//! the active one is chosen once at startup from configuration. Every
//! layer above depends only on the repository traits.

pub mod database;
pub mod file;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::errors::StorageError;
use crate::models::{NewOrder, Order, OrderStatus, PendingCheckout, ReconciliationError};

#[async_trait]
pub trait PendingCheckoutRepository: Send + Sync {
    /// Stores a pending checkout. Fails with
    /// [`StorageError::DuplicateTransaction`] when the provider
    /// reference is already staged.
    async fn put(&self, checkout: PendingCheckout) -> Result<(), StorageError>;

    async fn get(&self, provider_ref: &str) -> Result<Option<PendingCheckout>, StorageError>;

    /// Removes a pending checkout. Idempotent; removing an unknown
    /// reference is not an error.
    async fn remove(&self, provider_ref: &str) -> Result<(), StorageError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Allocates the next order number for the current calendar year
    /// and persists the order. Allocation and write are one operation
    /// under the backend's own serialization; concurrent callers never
    /// receive the same number (gaps are acceptable, duplicates are
    /// not).
    async fn insert_numbered(&self, order: NewOrder) -> Result<Order, StorageError>;

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, StorageError>;

    /// Lookup by the payment provider's transaction reference; used to
    /// tell "already materialized" apart from "never existed".
    async fn find_by_provider_ref(&self, provider_ref: &str)
        -> Result<Option<Order>, StorageError>;

    /// All orders, newest first.
    async fn list(&self) -> Result<Vec<Order>, StorageError>;

    /// Updates status and (only when supplied) remarks, bumping
    /// `updated_at`. Returns `None` when the order number is unknown;
    /// never an error.
    async fn update_status(
        &self,
        order_number: &str,
        status: OrderStatus,
        remarks: Option<String>,
    ) -> Result<Option<Order>, StorageError>;

    /// Hard delete. Returns whether a record was actually removed.
    async fn delete(&self, order_number: &str) -> Result<bool, StorageError>;
}

#[async_trait]
pub trait ReconciliationErrorRepository: Send + Sync {
    async fn append(&self, entry: ReconciliationError) -> Result<(), StorageError>;

    /// All entries, newest first.
    async fn list(&self) -> Result<Vec<ReconciliationError>, StorageError>;
}

/// The active backend's repositories, handed out once at startup.
#[derive(Clone)]
pub struct Storage {
    pub pending: Arc<dyn PendingCheckoutRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub errors: Arc<dyn ReconciliationErrorRepository>,
}

/// Builds the storage backend selected by configuration: a configured
/// `database_url` picks the database backend (connecting and optionally
/// migrating), anything else the file backend under `data_dir`.
pub async fn select(config: &AppConfig) -> anyhow::Result<Storage> {
    if let Some(url) = config.database_url.as_deref().filter(|u| !u.trim().is_empty()) {
        let store = database::DatabaseStore::connect(url, config.numbering(), config.auto_migrate)
            .await?;
        let store = Arc::new(store);
        Ok(Storage {
            pending: store.clone(),
            orders: store.clone(),
            errors: store,
        })
    } else {
        let store = Arc::new(file::FileStore::open(&config.data_dir, config.numbering()).await?);
        Ok(Storage {
            pending: store.clone(),
            orders: store.clone(),
            errors: store,
        })
    }
}
