use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Staged checkout keyed by the provider's transaction reference; the
/// primary key doubles as the at-most-one-per-reference constraint.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pending_checkouts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub provider_ref: String,

    pub items: Json,
    pub total_cents: i64,
    pub seller_note: Option<String>,
    pub buyer: Option<Json>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
