//! Admin endpoints for orders and the reconciliation ledger.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{BuyerContact, LineItem, Order, OrderStatus, ReconciliationError};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_number: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub payment_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,
    pub items: Vec<LineItem>,
    pub total_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer: Option<BuyerContact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let total_cents = order.display_total_cents();
        OrderResponse {
            order_number: order.order_number,
            status: order.status.to_string(),
            remarks: order.remarks,
            payment_method: order.payment_method.to_string(),
            provider_ref: order.provider_ref,
            items: order.items,
            total_cents,
            seller_note: order.seller_note,
            buyer: order.buyer,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub remarks: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct ReconciliationErrorResponse {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<ReconciliationError> for ReconciliationErrorResponse {
    fn from(entry: ReconciliationError) -> Self {
        ReconciliationErrorResponse {
            id: entry.id,
            provider_ref: entry.provider_ref,
            message: entry.message,
            amount_cents: entry.amount_cents,
            created_at: entry.created_at,
        }
    }
}

pub async fn list_orders(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.orders.list_orders().await?;
    Ok(Json(
        orders.into_iter().map(OrderResponse::from).collect::<Vec<_>>(),
    ))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.orders.get_order(&order_number).await?;
    Ok(Json(OrderResponse::from(order)))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = OrderStatus::parse(&request.status).ok_or_else(|| {
        ServiceError::Validation(format!("unknown order status: {}", request.status))
    })?;
    let updated = state
        .orders
        .update_status(&order_number, status, request.remarks)
        .await?;
    match updated {
        Some(order) => Ok(Json(OrderResponse::from(order))),
        None => Err(ServiceError::NotFound(format!(
            "order {order_number} not found"
        ))),
    }
}

pub async fn delete_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let deleted = state.orders.delete_order(&order_number).await?;
    if deleted {
        Ok((StatusCode::OK, Json(DeleteResponse { deleted: true })))
    } else {
        Err(ServiceError::NotFound(format!(
            "order {order_number} not found"
        )))
    }
}

pub async fn list_reconciliation_errors(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let entries = state.orders.list_reconciliation_errors().await?;
    Ok(Json(
        entries
            .into_iter()
            .map(ReconciliationErrorResponse::from)
            .collect::<Vec<_>>(),
    ))
}
