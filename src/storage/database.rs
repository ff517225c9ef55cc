//! sea-orm storage backend.
//!
//! Order-number allocation runs inside a transaction: read the per-year
//! counter and the existing numbers, insert with the next sequence,
//! bump the counter. A unique index on `orders.order_number` backs this
//! up; a duplicate-key insert is treated as a transient conflict and
//! retried once with a freshly computed number.

use chrono::{Datelike, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection,
    DatabaseTransaction, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
    TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use async_trait::async_trait;

use crate::entities::{order, order_counter, pending_checkout, reconciliation_error};
use crate::errors::StorageError;
use crate::migrator::Migrator;
use crate::models::{
    BuyerContact, NewOrder, Order, OrderNumbering, OrderStatus, PaymentMethod, PendingCheckout,
    ReconciliationError,
};
use crate::storage::{OrderRepository, PendingCheckoutRepository, ReconciliationErrorRepository};

pub struct DatabaseStore {
    db: DatabaseConnection,
    numbering: OrderNumbering,
}

impl DatabaseStore {
    pub fn new(db: DatabaseConnection, numbering: OrderNumbering) -> Self {
        Self { db, numbering }
    }

    pub async fn connect(
        url: &str,
        numbering: OrderNumbering,
        auto_migrate: bool,
    ) -> Result<Self, StorageError> {
        let mut options = ConnectOptions::new(url.to_owned());
        options.max_connections(10).sqlx_logging(false);
        let db = Database::connect(options).await?;
        if auto_migrate {
            Migrator::up(&db, None).await?;
        }
        debug!("Connected database storage backend");
        Ok(Self::new(db, numbering))
    }

    async fn allocate_and_insert(&self, new: &NewOrder) -> Result<Order, StorageError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let year = now.year();

        let existing: Vec<String> = order::Entity::find()
            .select_only()
            .column(order::Column::OrderNumber)
            .filter(
                order::Column::OrderNumber
                    .like(format!("{}-{}-%", self.numbering.prefix, year)),
            )
            .into_tuple()
            .all(&txn)
            .await?;
        let counter = order_counter::Entity::find_by_id(year).one(&txn).await?;
        let high_water = counter.as_ref().map(|c| c.last_sequence as u32);

        let sequence = self.numbering.next_sequence(
            existing.iter().map(String::as_str),
            high_water,
            year,
        );
        let order_number = self.numbering.format(year, sequence);

        let model = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number.clone()),
            status: Set(new.status.as_str().to_owned()),
            remarks: Set(None),
            payment_method: Set(new.payment_method.as_str().to_owned()),
            provider_ref: Set(new.provider_ref.clone()),
            items: Set(serde_json::to_value(&new.items)?),
            total_cents: Set(new.total_cents),
            seller_note: Set(new.seller_note.clone()),
            buyer_email: Set(new.buyer.as_ref().map(|b| b.email.clone())),
            buyer_name: Set(new.buyer.as_ref().and_then(|b| b.name.clone())),
            buyer_phone: Set(new.buyer.as_ref().and_then(|b| b.phone.clone())),
            buyer_address: Set(new.buyer.as_ref().and_then(|b| b.address.clone())),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let inserted = model.insert(&txn).await?;

        upsert_counter(&txn, counter, year, sequence).await?;
        txn.commit().await?;

        order_to_domain(inserted)
    }

    /// Runs one allocation attempt and retries once if the unique index
    /// on `orders.order_number` rejects it. A second rejection means the
    /// number space is contended beyond what a recompute can fix.
    async fn insert_with_retry<F, Fut>(&self, attempt: F) -> Result<Order, StorageError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<Order, StorageError>>,
    {
        match attempt().await {
            Err(StorageError::Db(err)) if is_unique_violation(&err) => {
                warn!(
                    error = %err,
                    "Order number collided with a concurrent insert; retrying once"
                );
                attempt().await.map_err(|retry_err| match retry_err {
                    StorageError::Db(inner) if is_unique_violation(&inner) => {
                        StorageError::OrderNumberConflict(format!(
                            "{}-{}",
                            self.numbering.prefix,
                            Utc::now().year()
                        ))
                    }
                    other => other,
                })
            }
            other => other,
        }
    }
}

async fn upsert_counter(
    txn: &DatabaseTransaction,
    existing: Option<order_counter::Model>,
    year: i32,
    sequence: u32,
) -> Result<(), DbErr> {
    match existing {
        Some(model) => {
            let mut active: order_counter::ActiveModel = model.into();
            active.last_sequence = Set(sequence as i32);
            active.update(txn).await?;
        }
        None => {
            order_counter::ActiveModel {
                year: Set(year),
                last_sequence: Set(sequence as i32),
            }
            .insert(txn)
            .await?;
        }
    }
    Ok(())
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn order_to_domain(model: order::Model) -> Result<Order, StorageError> {
    let status: OrderStatus = serde_json::from_value(Value::String(model.status))?;
    let payment_method: PaymentMethod = serde_json::from_value(Value::String(model.payment_method))?;
    let buyer = model.buyer_email.map(|email| BuyerContact {
        email,
        name: model.buyer_name,
        phone: model.buyer_phone,
        address: model.buyer_address,
    });
    Ok(Order {
        order_number: model.order_number,
        status,
        remarks: model.remarks,
        payment_method,
        provider_ref: model.provider_ref,
        items: serde_json::from_value(model.items)?,
        total_cents: model.total_cents,
        seller_note: model.seller_note,
        buyer,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn pending_to_domain(model: pending_checkout::Model) -> Result<PendingCheckout, StorageError> {
    Ok(PendingCheckout {
        provider_ref: model.provider_ref,
        items: serde_json::from_value(model.items)?,
        total_cents: model.total_cents,
        seller_note: model.seller_note,
        buyer: model.buyer.map(serde_json::from_value).transpose()?,
        created_at: model.created_at,
    })
}

fn entry_to_domain(model: reconciliation_error::Model) -> ReconciliationError {
    ReconciliationError {
        id: model.id,
        provider_ref: model.provider_ref,
        message: model.message,
        amount_cents: model.amount_cents,
        created_at: model.created_at,
    }
}

#[async_trait]
impl PendingCheckoutRepository for DatabaseStore {
    async fn put(&self, checkout: PendingCheckout) -> Result<(), StorageError> {
        let model = pending_checkout::ActiveModel {
            provider_ref: Set(checkout.provider_ref.clone()),
            items: Set(serde_json::to_value(&checkout.items)?),
            total_cents: Set(checkout.total_cents),
            seller_note: Set(checkout.seller_note),
            buyer: Set(checkout.buyer.map(serde_json::to_value).transpose()?),
            created_at: Set(checkout.created_at),
        };
        match model.insert(&self.db).await {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::DuplicateTransaction(checkout.provider_ref))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, provider_ref: &str) -> Result<Option<PendingCheckout>, StorageError> {
        pending_checkout::Entity::find_by_id(provider_ref)
            .one(&self.db)
            .await?
            .map(pending_to_domain)
            .transpose()
    }

    async fn remove(&self, provider_ref: &str) -> Result<(), StorageError> {
        pending_checkout::Entity::delete_by_id(provider_ref)
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for DatabaseStore {
    async fn insert_numbered(&self, new: NewOrder) -> Result<Order, StorageError> {
        self.insert_with_retry(|| self.allocate_and_insert(&new))
            .await
    }

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, StorageError> {
        order::Entity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&self.db)
            .await?
            .map(order_to_domain)
            .transpose()
    }

    async fn find_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<Order>, StorageError> {
        order::Entity::find()
            .filter(order::Column::ProviderRef.eq(provider_ref))
            .one(&self.db)
            .await?
            .map(order_to_domain)
            .transpose()
    }

    async fn list(&self) -> Result<Vec<Order>, StorageError> {
        order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(order_to_domain)
            .collect()
    }

    async fn update_status(
        &self,
        order_number: &str,
        status: OrderStatus,
        remarks: Option<String>,
    ) -> Result<Option<Order>, StorageError> {
        let Some(model) = order::Entity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let mut active: order::ActiveModel = model.into();
        active.status = Set(status.as_str().to_owned());
        if let Some(remarks) = remarks {
            active.remarks = Set(Some(remarks));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&self.db).await?;
        Ok(Some(order_to_domain(updated)?))
    }

    async fn delete(&self, order_number: &str) -> Result<bool, StorageError> {
        let result = order::Entity::delete_many()
            .filter(order::Column::OrderNumber.eq(order_number))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}

#[async_trait]
impl ReconciliationErrorRepository for DatabaseStore {
    async fn append(&self, entry: ReconciliationError) -> Result<(), StorageError> {
        reconciliation_error::ActiveModel {
            id: Set(entry.id),
            provider_ref: Set(entry.provider_ref),
            message: Set(entry.message),
            amount_cents: Set(entry.amount_cents),
            created_at: Set(entry.created_at),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ReconciliationError>, StorageError> {
        Ok(reconciliation_error::Entity::find()
            .order_by_desc(reconciliation_error::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(entry_to_domain)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use super::*;
    use crate::models::LineItem;
    use assert_matches::assert_matches;

    async fn store() -> DatabaseStore {
        let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
        // One connection so the in-memory database is shared.
        options.max_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        DatabaseStore::new(
            db,
            OrderNumbering {
                prefix: "BS".into(),
                start_sequence: 1,
            },
        )
    }

    fn checkout(provider_ref: &str) -> PendingCheckout {
        PendingCheckout {
            provider_ref: provider_ref.into(),
            items: vec![LineItem {
                product_id: "likes-500".into(),
                name: "500 Likes".into(),
                quantity: 1,
                price_cents: 250,
                fulfillment_target: "@buyer".into(),
            }],
            total_cents: 250,
            seller_note: Some("asap please".into()),
            buyer: Some(BuyerContact {
                email: "buyer@example.com".into(),
                name: Some("B. Uyer".into()),
                phone: None,
                address: None,
            }),
            created_at: Utc::now(),
        }
    }

    fn new_order(provider_ref: Option<&str>) -> NewOrder {
        NewOrder {
            status: OrderStatus::Eingegangen,
            payment_method: PaymentMethod::Card,
            provider_ref: provider_ref.map(Into::into),
            items: vec![],
            total_cents: Some(250),
            seller_note: None,
            buyer: None,
        }
    }

    /// Inserts an order with a fixed number, bypassing allocation. Stands
    /// in for an allocation whose computed number went stale under a
    /// concurrent writer.
    async fn insert_with_stale_number(
        store: &DatabaseStore,
        order_number: &str,
    ) -> Result<Order, StorageError> {
        let now = Utc::now();
        let inserted = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number.to_owned()),
            status: Set(OrderStatus::Eingegangen.as_str().to_owned()),
            remarks: Set(None),
            payment_method: Set(PaymentMethod::Card.as_str().to_owned()),
            provider_ref: Set(None),
            items: Set(serde_json::json!([])),
            total_cents: Set(Some(250)),
            seller_note: Set(None),
            buyer_email: Set(None),
            buyer_name: Set(None),
            buyer_phone: Set(None),
            buyer_address: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&store.db)
        .await
        .map_err(StorageError::from)?;
        order_to_domain(inserted)
    }

    #[tokio::test]
    async fn pending_round_trip_and_duplicate_rejection() {
        let store = store().await;
        let staged = checkout("C-1");
        store.put(staged.clone()).await.unwrap();
        assert_eq!(store.get("C-1").await.unwrap(), Some(staged));

        let err = store.put(checkout("C-1")).await.unwrap_err();
        assert_matches!(err, StorageError::DuplicateTransaction(r) if r == "C-1");

        store.remove("C-1").await.unwrap();
        assert_eq!(store.get("C-1").await.unwrap(), None);
        store.remove("C-1").await.unwrap();
    }

    #[tokio::test]
    async fn order_numbers_are_distinct_and_increase_after_deletion() {
        let store = store().await;
        let year = Utc::now().year();

        let first = store.insert_numbered(new_order(Some("C-1"))).await.unwrap();
        let second = store.insert_numbered(new_order(Some("C-2"))).await.unwrap();
        assert_eq!(first.order_number, format!("BS-{}-0001", year));
        assert_eq!(second.order_number, format!("BS-{}-0002", year));

        assert!(store.delete(&second.order_number).await.unwrap());
        let third = store.insert_numbered(new_order(Some("C-3"))).await.unwrap();
        assert_eq!(third.order_number, format!("BS-{}-0003", year));
    }

    #[tokio::test]
    async fn stale_number_collision_recomputes_on_retry() {
        let store = store().await;
        let year = Utc::now().year();
        store.insert_numbered(new_order(Some("C-1"))).await.unwrap();

        // First attempt replays a stale allocation that reuses 0001 and
        // trips the unique index; the retry runs the real allocator and
        // lands on the next free sequence.
        let new = new_order(Some("C-2"));
        let stale = AtomicBool::new(true);
        let order = store
            .insert_with_retry(|| async {
                if stale.swap(false, Ordering::SeqCst) {
                    insert_with_stale_number(&store, &format!("BS-{}-0001", year)).await
                } else {
                    store.allocate_and_insert(&new).await
                }
            })
            .await
            .unwrap();

        assert_eq!(order.order_number, format!("BS-{}-0002", year));
        assert_eq!(
            store.find_by_provider_ref("C-2").await.unwrap().unwrap().order_number,
            order.order_number
        );
    }

    #[tokio::test]
    async fn repeated_number_collision_surfaces_conflict() {
        let store = store().await;
        let year = Utc::now().year();
        store.insert_numbered(new_order(Some("C-1"))).await.unwrap();

        let taken = format!("BS-{}-0001", year);
        let err = store
            .insert_with_retry(|| insert_with_stale_number(&store, &taken))
            .await
            .unwrap_err();

        assert_matches!(err, StorageError::OrderNumberConflict(scope) if scope == format!("BS-{}", year));
    }

    #[tokio::test]
    async fn concurrent_inserts_allocate_distinct_numbers() {
        let store = Arc::new(store().await);

        let mut handles = Vec::new();
        for n in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert_numbered(new_order(Some(&format!("C-{}", n))))
                    .await
                    .unwrap()
                    .order_number
            }));
        }

        let mut numbers = HashSet::new();
        for handle in handles {
            assert!(numbers.insert(handle.await.unwrap()));
        }
        assert_eq!(numbers.len(), 8);
    }

    #[tokio::test]
    async fn provider_ref_lookup_finds_materialized_order() {
        let store = store().await;
        let order = store.insert_numbered(new_order(Some("C-9"))).await.unwrap();
        let found = store.find_by_provider_ref("C-9").await.unwrap().unwrap();
        assert_eq!(found.order_number, order.order_number);
        assert_eq!(store.find_by_provider_ref("C-10").await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_status_is_silent_on_unknown_and_keeps_remarks() {
        let store = store().await;
        assert_eq!(
            store
                .update_status("BS-2099-0001", OrderStatus::Gestartet, None)
                .await
                .unwrap(),
            None
        );

        let order = store.insert_numbered(new_order(None)).await.unwrap();
        store
            .update_status(&order.order_number, OrderStatus::Gestartet, Some("note".into()))
            .await
            .unwrap()
            .unwrap();
        let after = store
            .update_status(&order.order_number, OrderStatus::Abgeschlossen, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.status, OrderStatus::Abgeschlossen);
        assert_eq!(after.remarks.as_deref(), Some("note"));
    }
}
