use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use tracing::warn;

use crate::errors::ServiceError;
use crate::AppState;

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(payment_webhook))
}

/// Inbound settlement callback from the payment provider.
///
/// The body is consumed as raw bytes because the signature covers the exact
/// byte stream. Verification happens before any field is trusted; an
/// invalid signature is rejected outright. Recognized settlement events are
/// applied idempotently; everything else is acknowledged and ignored so the
/// provider never retries events we do not care about.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("missing signature header".to_string()))?;

    let event = match state.webhook_verifier.verify_and_parse(&body, signature) {
        Ok(event) => event,
        Err(e @ ServiceError::Unauthorized(_)) => {
            warn!("Payment webhook signature verification failed");
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    state.services.orders.apply_webhook_event(event).await?;

    Ok((StatusCode::OK, "ok"))
}
