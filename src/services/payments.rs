//! Payment provider adapter: hosted checkout session creation outbound,
//! signed webhook verification inbound.

use std::collections::HashMap;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Webhook event type acted upon; everything else is acknowledged and
/// ignored.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

const ORDER_ID_METADATA_KEY: &str = "order_id";

/// One line of a hosted checkout session.
#[derive(Debug, Clone)]
pub struct SessionLineItem {
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub order_id: Uuid,
    pub customer_email: Option<String>,
    pub line_items: Vec<SessionLineItem>,
    /// Provider-side coupon id applied to the whole session.
    pub discount_coupon: Option<String>,
}

/// Provider response for a created session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Outbound provider surface. Implemented by the real gateway and by test
/// doubles.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError>;

    /// Creates a single-use percent-off discount on the provider side and
    /// returns its id.
    async fn create_discount(&self, percent_off: Decimal) -> Result<String, ServiceError>;
}

/// Stripe-style gateway speaking form-encoded HTTPS.
pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
    success_url: String,
    cancel_url: String,
    currency: String,
}

impl StripeGateway {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: cfg.payment_secret_key.clone(),
            api_base: cfg.payment_api_base.clone(),
            success_url: cfg.checkout_success_url.clone(),
            cancel_url: cfg.checkout_cancel_url.clone(),
            currency: cfg.currency.clone(),
        }
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<serde_json::Value, ServiceError> {
        let response = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentFailed(format!("provider unreachable: {e}")))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::PaymentFailed(format!("invalid provider response: {e}")))?;

        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("provider rejected the request");
            return Err(ServiceError::PaymentFailed(message.to_string()));
        }

        Ok(body)
    }
}

#[async_trait]
impl PaymentProvider for StripeGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("payment_method_types[0]".into(), "card".into()),
            ("success_url".into(), self.success_url.clone()),
            ("cancel_url".into(), self.cancel_url.clone()),
            (
                format!("metadata[{ORDER_ID_METADATA_KEY}]"),
                request.order_id.to_string(),
            ),
        ];

        if let Some(email) = &request.customer_email {
            form.push(("customer_email".into(), email.clone()));
        }

        for (i, item) in request.line_items.iter().enumerate() {
            form.push((
                format!("line_items[{i}][price_data][currency]"),
                self.currency.clone(),
            ));
            form.push((
                format!("line_items[{i}][price_data][product_data][name]"),
                item.name.clone(),
            ));
            form.push((
                format!("line_items[{i}][price_data][unit_amount]"),
                to_minor_units(item.unit_price).to_string(),
            ));
            form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
        }

        if let Some(coupon) = &request.discount_coupon {
            form.push(("discounts[0][coupon]".into(), coupon.clone()));
        }

        let body = self.post_form("/v1/checkout/sessions", &form).await?;
        let session: CheckoutSession = serde_json::from_value(body)
            .map_err(|e| ServiceError::PaymentFailed(format!("malformed session: {e}")))?;

        info!(session_id = %session.id, "Created checkout session");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn create_discount(&self, percent_off: Decimal) -> Result<String, ServiceError> {
        let form = vec![
            ("duration".to_string(), "once".to_string()),
            ("percent_off".to_string(), percent_off.to_string()),
        ];
        let body = self.post_form("/v1/coupons", &form).await?;
        body.get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::PaymentFailed("malformed coupon response".to_string()))
    }
}

/// Prices are decimal major units; the provider wants integer minor units.
fn to_minor_units(price: Decimal) -> i64 {
    (price * Decimal::from(100)).round().to_i64().unwrap_or(0)
}

/// Inbound webhook event, parsed only after signature verification.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookEventData {
    pub object: WebhookEventObject,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookEventObject {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl WebhookEvent {
    /// The order-correlation id carried in session metadata, if present and
    /// well-formed.
    pub fn order_id(&self) -> Option<Uuid> {
        self.data
            .object
            .metadata
            .get(ORDER_ID_METADATA_KEY)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

/// Verifies `Stripe-Signature`-style headers (`t=<ts>,v1=<hex hmac>`) over
/// the exact raw body bytes before any field is trusted.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: String, tolerance_secs: i64) -> Self {
        Self {
            secret,
            tolerance_secs,
        }
    }

    #[instrument(skip_all)]
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, ServiceError> {
        let (timestamp, signature) = parse_signature_header(signature_header)?;

        let now = chrono::Utc::now().timestamp();
        if (now - timestamp).abs() > self.tolerance_secs {
            return Err(ServiceError::Unauthorized(
                "webhook timestamp outside tolerance".to_string(),
            ));
        }

        let expected = self.sign(timestamp, payload);
        if !constant_time_eq(&expected, &signature) {
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }

        serde_json::from_slice(payload)
            .map_err(|e| ServiceError::InvalidOperation(format!("invalid webhook payload: {e}")))
    }

    /// Hex HMAC-SHA256 over `"{timestamp}.{payload}"`.
    pub fn sign(&self, timestamp: i64, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

fn parse_signature_header(header: &str) -> Result<(i64, String), ServiceError> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(value)) => timestamp = value.parse::<i64>().ok(),
            (Some("v1"), Some(value)) => signature = Some(value.to_string()),
            _ => {}
        }
    }
    match (timestamp, signature) {
        (Some(t), Some(s)) => Ok((t, s)),
        _ => Err(ServiceError::Unauthorized(
            "malformed signature header".to_string(),
        )),
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SECRET: &str = "whsec_unit_test";

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SECRET.to_string(), 300)
    }

    fn signed_header(v: &WebhookVerifier, payload: &[u8]) -> String {
        let t = chrono::Utc::now().timestamp();
        format!("t={},v1={}", t, v.sign(t, payload))
    }

    fn settlement_payload(order_id: Uuid) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "type": CHECKOUT_SESSION_COMPLETED,
            "data": {
                "object": {
                    "id": "cs_1",
                    "payment_intent": "pi_123",
                    "metadata": { "order_id": order_id.to_string() }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn valid_signature_verifies_and_parses() {
        let v = verifier();
        let order_id = Uuid::new_v4();
        let payload = settlement_payload(order_id);
        let header = signed_header(&v, &payload);

        let event = v.verify_and_parse(&payload, &header).expect("verified");
        assert_eq!(event.event_type, CHECKOUT_SESSION_COMPLETED);
        assert_eq!(event.order_id(), Some(order_id));
        assert_eq!(event.data.object.payment_intent.as_deref(), Some("pi_123"));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let v = verifier();
        let payload = settlement_payload(Uuid::new_v4());
        let header = signed_header(&v, &payload);

        let mut tampered = payload.clone();
        tampered[0] ^= 0x01;
        assert!(v.verify_and_parse(&tampered, &header).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let v = verifier();
        let other = WebhookVerifier::new("whsec_other".to_string(), 300);
        let payload = settlement_payload(Uuid::new_v4());
        let header = signed_header(&other, &payload);

        assert!(v.verify_and_parse(&payload, &header).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let v = verifier();
        let payload = settlement_payload(Uuid::new_v4());
        let stale = chrono::Utc::now().timestamp() - 3600;
        let header = format!("t={},v1={}", stale, v.sign(stale, &payload));

        assert!(v.verify_and_parse(&payload, &header).is_err());
    }

    #[test]
    fn malformed_header_is_rejected() {
        let v = verifier();
        let payload = settlement_payload(Uuid::new_v4());
        assert!(v.verify_and_parse(&payload, "v1=deadbeef").is_err());
        assert!(v.verify_and_parse(&payload, "garbage").is_err());
    }

    #[test]
    fn event_without_order_metadata_yields_no_correlation() {
        let payload = serde_json::json!({
            "id": "evt_2",
            "type": CHECKOUT_SESSION_COMPLETED,
            "data": { "object": { "id": "cs_2", "metadata": {} } }
        });
        let event: WebhookEvent = serde_json::from_value(payload).unwrap();
        assert_eq!(event.order_id(), None);
    }

    #[test]
    fn minor_units_round_decimal_prices() {
        assert_eq!(to_minor_units(dec!(19.99)), 1999);
        assert_eq!(to_minor_units(dec!(100)), 10000);
        assert_eq!(to_minor_units(dec!(0.01)), 1);
    }
}
