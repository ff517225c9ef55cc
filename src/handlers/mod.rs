pub mod checkout;
pub mod orders;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::errors::ServiceError;
use crate::AppState;

/// Shared-secret bearer guard for the admin surface. Without a
/// configured token every admin request is rejected.
pub async fn admin_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Err(ServiceError::Unauthorized(
            "admin access is not configured".into(),
        ));
    };
    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if provided == Some(expected) {
        Ok(next.run(req).await)
    } else {
        Err(ServiceError::Unauthorized("invalid admin token".into()))
    }
}
