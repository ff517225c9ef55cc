//! JSON-file storage backend.
//!
//! Each record family lives in one JSON file under the data directory.
//! Every operation is a whole-file read-modify-write guarded by a
//! per-family mutex, which is also what serializes order-number
//! allocation. Writes go to a temp file first and are renamed into
//! place.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use async_trait::async_trait;

use crate::errors::StorageError;
use crate::models::{
    NewOrder, Order, OrderNumbering, OrderStatus, PendingCheckout, ReconciliationError,
};
use crate::storage::{OrderRepository, PendingCheckoutRepository, ReconciliationErrorRepository};

const ORDERS_FILE: &str = "orders.json";
const PENDING_FILE: &str = "pending_checkouts.json";
const ERRORS_FILE: &str = "reconciliation_errors.json";

/// On-disk shape of the orders file. `counters` is the per-year
/// high-water mark of issued sequence numbers; keeping it alongside the
/// records prevents number reuse after the highest order was deleted.
#[derive(Debug, Default, Serialize, Deserialize)]
struct OrdersFile {
    #[serde(default)]
    counters: HashMap<i32, u32>,
    #[serde(default)]
    orders: Vec<Order>,
}

pub struct FileStore {
    orders_path: PathBuf,
    pending_path: PathBuf,
    errors_path: PathBuf,
    numbering: OrderNumbering,
    orders_lock: Mutex<()>,
    pending_lock: Mutex<()>,
    errors_lock: Mutex<()>,
}

impl FileStore {
    pub async fn open(
        data_dir: impl AsRef<Path>,
        numbering: OrderNumbering,
    ) -> Result<Self, StorageError> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir).await?;
        debug!(data_dir = %dir.display(), "Opened file storage backend");
        Ok(Self {
            orders_path: dir.join(ORDERS_FILE),
            pending_path: dir.join(PENDING_FILE),
            errors_path: dir.join(ERRORS_FILE),
            numbering,
            orders_lock: Mutex::new(()),
            pending_lock: Mutex::new(()),
            errors_lock: Mutex::new(()),
        })
    }
}

async fn load<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StorageError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(err.into()),
    }
}

async fn save<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl PendingCheckoutRepository for FileStore {
    async fn put(&self, checkout: PendingCheckout) -> Result<(), StorageError> {
        let _guard = self.pending_lock.lock().await;
        let mut pending: Vec<PendingCheckout> = load(&self.pending_path).await?;
        if pending.iter().any(|p| p.provider_ref == checkout.provider_ref) {
            return Err(StorageError::DuplicateTransaction(checkout.provider_ref));
        }
        pending.push(checkout);
        save(&self.pending_path, &pending).await
    }

    async fn get(&self, provider_ref: &str) -> Result<Option<PendingCheckout>, StorageError> {
        let _guard = self.pending_lock.lock().await;
        let pending: Vec<PendingCheckout> = load(&self.pending_path).await?;
        Ok(pending.into_iter().find(|p| p.provider_ref == provider_ref))
    }

    async fn remove(&self, provider_ref: &str) -> Result<(), StorageError> {
        let _guard = self.pending_lock.lock().await;
        let mut pending: Vec<PendingCheckout> = load(&self.pending_path).await?;
        let before = pending.len();
        pending.retain(|p| p.provider_ref != provider_ref);
        if pending.len() != before {
            save(&self.pending_path, &pending).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for FileStore {
    async fn insert_numbered(&self, order: NewOrder) -> Result<Order, StorageError> {
        let _guard = self.orders_lock.lock().await;
        let mut file: OrdersFile = load(&self.orders_path).await?;

        let now = Utc::now();
        let year = now.year();
        let sequence = self.numbering.next_sequence(
            file.orders.iter().map(|o| o.order_number.as_str()),
            file.counters.get(&year).copied(),
            year,
        );
        let order_number = self.numbering.format(year, sequence);

        let record = Order {
            order_number: order_number.clone(),
            status: order.status,
            remarks: None,
            payment_method: order.payment_method,
            provider_ref: order.provider_ref,
            items: order.items,
            total_cents: order.total_cents,
            seller_note: order.seller_note,
            buyer: order.buyer,
            created_at: now,
            updated_at: now,
        };

        file.counters.insert(year, sequence);
        file.orders.push(record.clone());
        save(&self.orders_path, &file).await?;
        debug!(order_number = %order_number, "Order persisted to file store");
        Ok(record)
    }

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, StorageError> {
        let _guard = self.orders_lock.lock().await;
        let file: OrdersFile = load(&self.orders_path).await?;
        Ok(file.orders.into_iter().find(|o| o.order_number == order_number))
    }

    async fn find_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<Order>, StorageError> {
        let _guard = self.orders_lock.lock().await;
        let file: OrdersFile = load(&self.orders_path).await?;
        Ok(file
            .orders
            .into_iter()
            .find(|o| o.provider_ref.as_deref() == Some(provider_ref)))
    }

    async fn list(&self) -> Result<Vec<Order>, StorageError> {
        let _guard = self.orders_lock.lock().await;
        let file: OrdersFile = load(&self.orders_path).await?;
        let mut orders = file.orders;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_status(
        &self,
        order_number: &str,
        status: OrderStatus,
        remarks: Option<String>,
    ) -> Result<Option<Order>, StorageError> {
        let _guard = self.orders_lock.lock().await;
        let mut file: OrdersFile = load(&self.orders_path).await?;
        let Some(order) = file.orders.iter_mut().find(|o| o.order_number == order_number) else {
            return Ok(None);
        };
        order.status = status;
        if let Some(remarks) = remarks {
            order.remarks = Some(remarks);
        }
        order.updated_at = Utc::now();
        let updated = order.clone();
        save(&self.orders_path, &file).await?;
        Ok(Some(updated))
    }

    async fn delete(&self, order_number: &str) -> Result<bool, StorageError> {
        let _guard = self.orders_lock.lock().await;
        let mut file: OrdersFile = load(&self.orders_path).await?;
        let before = file.orders.len();
        file.orders.retain(|o| o.order_number != order_number);
        let removed = file.orders.len() != before;
        if removed {
            save(&self.orders_path, &file).await?;
        }
        Ok(removed)
    }
}

#[async_trait]
impl ReconciliationErrorRepository for FileStore {
    async fn append(&self, entry: ReconciliationError) -> Result<(), StorageError> {
        let _guard = self.errors_lock.lock().await;
        let mut entries: Vec<ReconciliationError> = load(&self.errors_path).await?;
        entries.push(entry);
        save(&self.errors_path, &entries).await
    }

    async fn list(&self) -> Result<Vec<ReconciliationError>, StorageError> {
        let _guard = self.errors_lock.lock().await;
        let mut entries: Vec<ReconciliationError> = load(&self.errors_path).await?;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }
}
