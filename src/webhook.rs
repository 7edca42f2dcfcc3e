//! Payment webhook verification and dispatch.
//!
//! The provider signs each delivery with `HMAC-SHA256(secret, raw_body)`,
//! hex-encoded in the `x-razorpay-signature` header. Verification must run
//! over the exact bytes received: parsing and re-serializing the JSON would
//! change its layout and break the digest.
//!
//! [`handle_webhook`] is transport-agnostic. It returns a [`WebhookResponse`]
//! that the HTTP layer turns into a reply.
//!
//! ```
//! use timeloop::webhook::{LoggingEventHandler, compute_signature, handle_webhook};
//!
//! let body = br#"{"event":"order.paid","data":{"object":{"id":"order_1","amount":99900}}}"#;
//! let signature = compute_signature("whsec", body)?;
//!
//! let response = handle_webhook(Some("whsec"), body, Some(&signature), &LoggingEventHandler);
//! assert_eq!(response.status, 200);
//!
//! let response = handle_webhook(Some("whsec"), body, Some("00ff"), &LoggingEventHandler);
//! assert_eq!(response.status, 400);
//! # Ok::<(), timeloop::TimeloopError>(())
//! ```

use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;

use crate::error::TimeloopError;

/// Header carrying the hex-encoded signature.
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str, body: &[u8]) -> Result<HmacSha256, TimeloopError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|error| TimeloopError::Configuration(format!("Invalid HMAC key: {error}")))?;
    mac.update(body);
    Ok(mac)
}

/// Hex-encoded `HMAC-SHA256(secret, body)`.
///
/// # Errors
///
/// Returns [`TimeloopError::Configuration`] if the key is rejected.
pub fn compute_signature(secret: &str, body: &[u8]) -> Result<String, TimeloopError> {
    Ok(hex::encode(mac_for(secret, body)?.finalize().into_bytes()))
}

/// Check a hex signature against `body` in constant time.
///
/// # Errors
///
/// Returns [`TimeloopError::InvalidSignature`] if the signature is not hex
/// or does not match.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> Result<(), TimeloopError> {
    let expected = hex::decode(signature.trim()).map_err(|_| TimeloopError::InvalidSignature)?;
    mac_for(secret, body)?
        .verify_slice(&expected)
        .map_err(|_| TimeloopError::InvalidSignature)
}

/// A verified webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    /// `payment.captured`
    PaymentCaptured {
        /// Payment id.
        payment_id: Option<String>,
        /// Order the payment belongs to.
        order_id: Option<String>,
        /// Amount in the smallest currency unit.
        amount: Option<u64>,
        /// Provider status string.
        status: Option<String>,
    },
    /// `payment.failed`
    PaymentFailed {
        /// Payment id.
        payment_id: Option<String>,
        /// Order the payment belongs to.
        order_id: Option<String>,
        /// Provider failure reason.
        reason: Option<String>,
    },
    /// `order.paid`
    OrderPaid {
        /// Order id.
        order_id: Option<String>,
        /// Amount in the smallest currency unit.
        amount: Option<u64>,
        /// Provider status string.
        status: Option<String>,
    },
    /// `refund.created`
    RefundCreated {
        /// Refund id.
        refund_id: Option<String>,
        /// Refunded payment.
        payment_id: Option<String>,
        /// Amount in the smallest currency unit.
        amount: Option<u64>,
    },
    /// Any other event type; acknowledged without action.
    Other {
        /// The `event` field as received.
        event: String,
    },
}

/// Field view over `data.object`. Fields of an unexpected type read as absent.
struct EventObject<'a>(Option<&'a Value>);

impl EventObject<'_> {
    fn text(&self, field: &str) -> Option<String> {
        self.0?.get(field)?.as_str().map(str::to_owned)
    }

    fn amount(&self, field: &str) -> Option<u64> {
        self.0?.get(field)?.as_u64()
    }
}

impl PaymentEvent {
    /// Parse a verified webhook body.
    ///
    /// # Errors
    ///
    /// Returns [`TimeloopError::Json`] if the body is not valid JSON. Any JSON
    /// body parses: a missing or non-string `event` is [`PaymentEvent::Other`]
    /// with an empty name.
    pub fn parse(body: &[u8]) -> Result<Self, TimeloopError> {
        let envelope: Value = serde_json::from_slice(body)?;
        let event = envelope
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let object = EventObject(envelope.pointer("/data/object"));

        Ok(match event.as_str() {
            "payment.captured" => PaymentEvent::PaymentCaptured {
                payment_id: object.text("id"),
                order_id: object.text("order_id"),
                amount: object.amount("amount"),
                status: object.text("status"),
            },
            "payment.failed" => PaymentEvent::PaymentFailed {
                payment_id: object.text("id"),
                order_id: object.text("order_id"),
                reason: object.text("error_reason"),
            },
            "order.paid" => PaymentEvent::OrderPaid {
                order_id: object.text("id"),
                amount: object.amount("amount"),
                status: object.text("status"),
            },
            "refund.created" => PaymentEvent::RefundCreated {
                refund_id: object.text("id"),
                payment_id: object.text("payment_id"),
                amount: object.amount("amount"),
            },
            _ => PaymentEvent::Other { event },
        })
    }

    /// The provider's event name.
    pub fn name(&self) -> &str {
        match self {
            PaymentEvent::PaymentCaptured { .. } => "payment.captured",
            PaymentEvent::PaymentFailed { .. } => "payment.failed",
            PaymentEvent::OrderPaid { .. } => "order.paid",
            PaymentEvent::RefundCreated { .. } => "refund.created",
            PaymentEvent::Other { event } => event,
        }
    }
}

/// Receives verified events.
///
/// Handlers cannot fail the delivery: a verified event is acknowledged
/// whatever the handler does with it.
pub trait PaymentEventHandler: Send + Sync {
    /// Process one event.
    fn handle(&self, event: &PaymentEvent);
}

/// Handler that only logs each event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventHandler;

impl PaymentEventHandler for LoggingEventHandler {
    fn handle(&self, event: &PaymentEvent) {
        match event {
            PaymentEvent::PaymentCaptured {
                payment_id,
                order_id,
                amount,
                status,
            } => log::info!(
                "Payment captured: payment={payment_id:?} order={order_id:?} amount={amount:?} status={status:?}"
            ),
            PaymentEvent::PaymentFailed {
                payment_id,
                order_id,
                reason,
            } => log::info!(
                "Payment failed: payment={payment_id:?} order={order_id:?} reason={reason:?}"
            ),
            PaymentEvent::OrderPaid {
                order_id,
                amount,
                status,
            } => log::info!("Order paid: order={order_id:?} amount={amount:?} status={status:?}"),
            PaymentEvent::RefundCreated {
                refund_id,
                payment_id,
                amount,
            } => log::info!(
                "Refund created: refund={refund_id:?} payment={payment_id:?} amount={amount:?}"
            ),
            PaymentEvent::Other { event } => log::info!("Unhandled webhook event: {event}"),
        }
    }
}

/// Outcome of a webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookResponse {
    /// HTTP status to return.
    pub status: u16,
    /// JSON body to return.
    pub body: Value,
}

impl WebhookResponse {
    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

/// Verify and dispatch one webhook delivery.
///
/// | Condition                           | Status |
/// |-------------------------------------|--------|
/// | no secret configured                | 500    |
/// | signature header absent             | 400    |
/// | signature does not match `raw_body` | 400    |
/// | verified body is not valid JSON     | 500    |
/// | verified                            | 200 `{"received": true}` |
///
/// The handler runs only for verified deliveries.
pub fn handle_webhook(
    secret: Option<&str>,
    raw_body: &[u8],
    signature: Option<&str>,
    handler: &dyn PaymentEventHandler,
) -> WebhookResponse {
    let Some(secret) = secret.filter(|secret| !secret.is_empty()) else {
        log::error!("Webhook secret not configured");
        return WebhookResponse::error(500, TimeloopError::WebhookSecretMissing.to_string());
    };

    let Some(signature) = signature else {
        log::warn!("Webhook delivery without {SIGNATURE_HEADER} header");
        return WebhookResponse::error(400, TimeloopError::MissingSignature.to_string());
    };

    if let Err(error) = verify_signature(secret, raw_body, signature) {
        log::warn!("Webhook signature verification failed");
        let status = if matches!(error, TimeloopError::InvalidSignature) { 400 } else { 500 };
        return WebhookResponse::error(status, error.to_string());
    }

    let event = match PaymentEvent::parse(raw_body) {
        Ok(event) => event,
        Err(error) => {
            log::error!("Verified webhook body could not be parsed: {error}");
            return WebhookResponse::error(500, error.to_string());
        }
    };

    log::info!("Webhook verified: {}", event.name());
    handler.handle(&event);

    WebhookResponse {
        status: 200,
        body: json!({ "received": true }),
    }
}
