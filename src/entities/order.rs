use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-readable `<PREFIX>-<YEAR>-<NNNN>` number; a unique index
    /// backs the allocate-and-write contract.
    #[sea_orm(unique)]
    pub order_number: String,

    pub status: String,
    pub remarks: Option<String>,
    pub payment_method: String,
    pub provider_ref: Option<String>,
    pub items: Json,
    pub total_cents: Option<i64>,
    pub seller_note: Option<String>,
    pub buyer_email: Option<String>,
    pub buyer_name: Option<String>,
    pub buyer_phone: Option<String>,
    pub buyer_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
