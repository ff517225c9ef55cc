use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// JSON body returned for every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category, e.g. "Not Found".
    pub error: String,
    /// Human-readable description. For failures after a provider already
    /// confirmed payment this is always the generic support message,
    /// never the raw cause.
    pub message: String,
    /// ISO 8601 timestamp when the error occurred.
    pub timestamp: String,
}

/// Errors raised by the storage backends. Both the file-based and the
/// database-backed implementation funnel into this one type so the
/// layers above stay backend-agnostic.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    /// A pending checkout already exists for this provider reference.
    #[error("pending checkout already exists for provider reference {0}")]
    DuplicateTransaction(String),

    /// Order-number allocation collided twice in a row. The first
    /// collision is retried internally and never surfaces.
    #[error("order number conflict for {0}")]
    OrderNumberConflict(String),
}

/// Service-level error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Credential exchange with a payment provider failed or the
    /// provider is not configured at all.
    #[error("provider authentication failed: {0}")]
    ProviderAuth(String),

    /// The provider rejected the create-transaction request.
    #[error("provider rejected the request: {0}")]
    ProviderRequest(String),

    /// Capture/verification failed on the network or provider side.
    /// Outcome is unknown; the caller records a reconciliation entry.
    #[error("provider verification failed: {0}")]
    ProviderVerify(String),

    /// The provider reported a clean non-final or failed payment state.
    /// No money moved; the buyer may retry.
    #[error("payment was not completed: {0}")]
    PaymentNotCompleted(String),

    #[error("pending checkout already exists for provider reference {0}")]
    DuplicateTransaction(String),

    /// No pending checkout and no existing order for the reference.
    /// Only raised after the already-processed disambiguation check.
    #[error("no matching checkout for provider reference {0}")]
    CheckoutNotFound(String),

    /// Post-confirmation storage failure: money may have moved without a
    /// corresponding order. Always paired with a reconciliation entry.
    #[error("order could not be persisted for provider reference {provider_ref}")]
    OrderPersistence { provider_ref: String },

    #[error("order number conflict: {0}")]
    OrderNumberConflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateTransaction(r) => ServiceError::DuplicateTransaction(r),
            StorageError::OrderNumberConflict(r) => ServiceError::OrderNumberConflict(r),
            other => ServiceError::Storage(other),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) | ServiceError::DuplicateTransaction(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound(_) | ServiceError::CheckoutNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::PaymentNotCompleted(_) => StatusCode::PAYMENT_REQUIRED,
            ServiceError::ProviderAuth(_)
            | ServiceError::ProviderRequest(_)
            | ServiceError::ProviderVerify(_) => StatusCode::BAD_GATEWAY,
            ServiceError::OrderPersistence { .. }
            | ServiceError::OrderNumberConflict(_)
            | ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Buyer-facing message. Provider failures collapse to a retryable
    /// hint; post-confirmation failures render the support message with
    /// the provider reference and nothing else.
    fn public_message(&self) -> String {
        match self {
            ServiceError::ProviderAuth(_)
            | ServiceError::ProviderRequest(_)
            | ServiceError::ProviderVerify(_) => {
                "Payment could not be completed. Please try again.".to_string()
            }
            ServiceError::PaymentNotCompleted(_) => {
                "The payment was not completed. Please try again.".to_string()
            }
            // CheckoutNotFound is only raised after the provider confirmed
            // payment, so it gets the same support rendering as a failed
            // persistence instead of its raw cause.
            ServiceError::CheckoutNotFound(provider_ref)
            | ServiceError::OrderPersistence { provider_ref } => format!(
                "Something went wrong while completing your order. Please contact support and quote reference {}.",
                provider_ref
            ),
            ServiceError::Storage(_) | ServiceError::OrderNumberConflict(_) => {
                "Something went wrong. Please try again later.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            message: self.public_message(),
            timestamp: Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}
