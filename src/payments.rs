//! Payment provider clients.
//!
//! Two independent integrations: order-based checkout through Razorpay
//! ([`RazorpayClient`]) and hosted checkout sessions through Stripe
//! ([`StripeClient`]). Each is a single request to the provider; the server
//! only holds the secret keys so the browser never sees them.

use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::TimeloopError, settings::Settings};

/// Razorpay REST root.
pub const RAZORPAY_BASE_URL: &str = "https://api.razorpay.com/v1";

/// Stripe REST root.
pub const STRIPE_BASE_URL: &str = "https://api.stripe.com/v1";

/// Currency used when an order does not name one.
pub const DEFAULT_CURRENCY: &str = "INR";

const DEFAULT_ORDER_DESCRIPTION: &str = "Timeloop AI Payment";
const DEFAULT_SUCCESS_URL: &str = "https://example.com/success";
const DEFAULT_CANCEL_URL: &str = "https://example.com/cancel";

/// Pull a human-readable message out of a provider error body.
///
/// Razorpay uses `error.description`, Stripe uses `error.message`.
async fn provider_error(provider: &'static str, response: Response) -> TimeloopError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| {
            let error = value.get("error")?;
            error
                .get("description")
                .or_else(|| error.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or(body);
    log::warn!("{provider} returned HTTP {status}: {message}");
    TimeloopError::PaymentProvider {
        provider,
        status,
        message,
    }
}

/// Body accepted by the order endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// Amount in the smallest currency unit (paise for INR). Required.
    pub amount: Option<u64>,
    /// ISO currency code; defaults to `INR`.
    pub currency: Option<String>,
    /// Merchant receipt id; defaults to `rcpt_<unix millis>`.
    pub receipt: Option<String>,
    /// Free-text description stored in the order notes.
    pub description: Option<String>,
}

/// What the browser needs to open the provider's checkout widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    /// Provider order id.
    pub order_id: String,
    /// Amount as recorded by the provider.
    pub amount: u64,
    /// Currency as recorded by the provider.
    pub currency: String,
    /// Public key id for the checkout widget.
    pub key_id: String,
}

#[derive(Debug, Serialize)]
struct RazorpayOrderBody<'a> {
    amount: u64,
    currency: &'a str,
    receipt: String,
    payment_capture: u8,
    notes: RazorpayNotes<'a>,
}

#[derive(Debug, Serialize)]
struct RazorpayNotes<'a> {
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: u64,
    currency: String,
}

/// Creates orders through the Razorpay Orders API.
#[derive(Debug, Clone)]
pub struct RazorpayClient {
    key_id: String,
    key_secret: String,
    base_url: String,
    client: Client,
}

impl RazorpayClient {
    /// Create a client with API credentials.
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            base_url: RAZORPAY_BASE_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Create a client from loaded [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns [`TimeloopError::Configuration`] unless both keys are set.
    pub fn from_settings(settings: &Settings) -> Result<Self, TimeloopError> {
        Ok(Self::new(
            Settings::require(&settings.razorpay_key_id, "RAZORPAY_KEY_ID")?,
            Settings::require(&settings.razorpay_key_secret, "RAZORPAY_KEY_SECRET")?,
        ))
    }

    /// Point the client at a different API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Create an auto-captured order.
    ///
    /// # Errors
    ///
    /// Returns [`TimeloopError::InvalidPaymentRequest`] if `amount` is
    /// missing or zero, [`TimeloopError::PaymentProvider`] if the provider
    /// rejects the order, or [`TimeloopError::Http`] on transport failure.
    pub async fn create_order(&self, request: &OrderRequest) -> Result<OrderResponse, TimeloopError> {
        let amount = request
            .amount
            .filter(|amount| *amount > 0)
            .ok_or_else(|| {
                TimeloopError::InvalidPaymentRequest("amount is required (in paise)".to_string())
            })?;

        let receipt = request.receipt.clone().unwrap_or_else(|| {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis();
            format!("rcpt_{millis}")
        });

        let body = RazorpayOrderBody {
            amount,
            currency: request.currency.as_deref().unwrap_or(DEFAULT_CURRENCY),
            receipt,
            payment_capture: 1,
            notes: RazorpayNotes {
                description: request
                    .description
                    .as_deref()
                    .unwrap_or(DEFAULT_ORDER_DESCRIPTION),
            },
        };

        log::info!("Creating order for {} {}", body.amount, body.currency);
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error("razorpay", response).await);
        }

        let order: RazorpayOrder = response.json().await?;
        log::info!("Created order {}", order.id);
        Ok(OrderResponse {
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
            key_id: self.key_id.clone(),
        })
    }
}

/// Body accepted by the checkout-session endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Provider price id. Required.
    pub price_id: Option<String>,
    /// Redirect after payment.
    pub success_url: Option<String>,
    /// Redirect after abandoning checkout.
    pub cancel_url: Option<String>,
}

/// A created checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Hosted checkout page to redirect the browser to.
    pub url: Option<String>,
    /// Session id.
    pub id: String,
}

/// Creates hosted checkout sessions through the Stripe API.
#[derive(Debug, Clone)]
pub struct StripeClient {
    secret_key: String,
    base_url: String,
    client: Client,
}

impl StripeClient {
    /// Create a client with a secret key.
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            base_url: STRIPE_BASE_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Create a client from loaded [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns [`TimeloopError::Configuration`] if no secret key is set.
    pub fn from_settings(settings: &Settings) -> Result<Self, TimeloopError> {
        Ok(Self::new(Settings::require(
            &settings.stripe_secret_key,
            "STRIPE_SECRET_KEY",
        )?))
    }

    /// Point the client at a different API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Create a one-item, pay-once checkout session.
    ///
    /// # Errors
    ///
    /// Returns [`TimeloopError::InvalidPaymentRequest`] without a price id,
    /// [`TimeloopError::PaymentProvider`] if the provider rejects the session,
    /// or [`TimeloopError::Http`] on transport failure.
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, TimeloopError> {
        let price_id = request
            .price_id
            .as_deref()
            .filter(|price| !price.is_empty())
            .ok_or_else(|| TimeloopError::InvalidPaymentRequest("priceId is required".to_string()))?;

        let form = [
            ("mode", "payment"),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            (
                "success_url",
                request.success_url.as_deref().unwrap_or(DEFAULT_SUCCESS_URL),
            ),
            (
                "cancel_url",
                request.cancel_url.as_deref().unwrap_or(DEFAULT_CANCEL_URL),
            ),
        ];

        log::info!("Creating checkout session for price {price_id}");
        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error("stripe", response).await);
        }

        Ok(response.json().await?)
    }
}
