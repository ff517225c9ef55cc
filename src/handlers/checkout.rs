//! Buyer-facing checkout endpoints.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::{BuyerContact, LineItem};
use crate::services::checkout::{Cart, MaterializeOutcome};
use crate::AppState;

// Serialize: the length rule on `items` embeds the offending value in
// the validation error params.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LineItemRequest {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
    #[validate(range(min = 0))]
    pub price_cents: i64,
    #[validate(length(min = 1, message = "fulfillment target is required"))]
    pub fulfillment_target: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BuyerContactRequest {
    #[validate(email)]
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, message = "at least one line item is required"))]
    pub items: Vec<LineItemRequest>,
    #[validate(range(min = 1))]
    pub total_cents: i64,
    pub seller_note: Option<String>,
    #[validate]
    pub buyer: Option<BuyerContactRequest>,
}

impl From<CheckoutRequest> for Cart {
    fn from(request: CheckoutRequest) -> Self {
        Cart {
            items: request
                .items
                .into_iter()
                .map(|item| LineItem {
                    product_id: item.product_id,
                    name: item.name,
                    quantity: item.quantity,
                    price_cents: item.price_cents,
                    fulfillment_target: item.fulfillment_target,
                })
                .collect(),
            total_cents: request.total_cents,
            seller_note: request.seller_note,
            buyer: request.buyer.map(|buyer| BuyerContact {
                email: buyer.email,
                name: buyer.name,
                phone: buyer.phone,
                address: buyer.address,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BegunCheckoutResponse {
    pub provider_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    pub provider_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmParams {
    /// Provider transaction reference carried through the redirect.
    #[serde(rename = "ref")]
    pub provider_ref: String,
}

#[derive(Debug, Serialize)]
pub struct MaterializedResponse {
    pub order_number: String,
    pub status: String,
    /// True when this confirmation was a duplicate of one already
    /// processed; no second order was created.
    pub already_processed: bool,
}

impl From<MaterializeOutcome> for MaterializedResponse {
    fn from(outcome: MaterializeOutcome) -> Self {
        let already_processed = matches!(outcome, MaterializeOutcome::AlreadyProcessed(_));
        let order = outcome.order();
        MaterializedResponse {
            order_number: order.order_number.clone(),
            status: order.status.to_string(),
            already_processed,
        }
    }
}

pub async fn begin_wallet(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    request.validate()?;
    let begun = state.checkout.begin_wallet_checkout(request.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(BegunCheckoutResponse {
            provider_ref: begun.provider_ref,
            approval_url: begun.approval_url,
        }),
    ))
}

pub async fn capture_wallet(
    State(state): State<AppState>,
    Json(request): Json<CaptureRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.checkout.capture_wallet(&request.provider_ref).await?;
    Ok(Json(MaterializedResponse::from(outcome)))
}

pub async fn begin_card(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    request.validate()?;
    let begun = state.checkout.begin_card_checkout(request.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(BegunCheckoutResponse {
            provider_ref: begun.provider_ref,
            approval_url: begun.approval_url,
        }),
    ))
}

pub async fn confirm_card(
    State(state): State<AppState>,
    Query(params): Query<ConfirmParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.checkout.confirm_card(&params.provider_ref).await?;
    Ok(Json(MaterializedResponse::from(outcome)))
}

pub async fn submit_bank_transfer(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    request.validate()?;
    let order = state.checkout.submit_bank_transfer(request.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(super::orders::OrderResponse::from(order)),
    ))
}
