//! Service settings loaded from the environment.
//!
//! The binary loads a `.env` file first (via `dotenvy`), so every value can
//! live there during development.

use crate::error::TimeloopError;

/// Default listen address for the HTTP service.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";

/// Credentials and endpoints for the external collaborators.
///
/// Every credential is optional at load time; the component that needs it
/// reports a [`TimeloopError::Configuration`] error when it is missing.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// `GEMINI_API_KEY`.
    pub gemini_api_key: Option<String>,
    /// `GEMINI_MODEL`, defaulting to `gemini-2.5-flash`.
    pub gemini_model: String,
    /// `RAZORPAY_KEY_ID`, the public key returned with each order.
    pub razorpay_key_id: Option<String>,
    /// `RAZORPAY_KEY_SECRET`.
    pub razorpay_key_secret: Option<String>,
    /// `RAZORPAY_WEBHOOK_SECRET`, the shared HMAC secret for webhooks.
    pub razorpay_webhook_secret: Option<String>,
    /// `STRIPE_SECRET_KEY`.
    pub stripe_secret_key: Option<String>,
    /// `TIMELOOP_BIND_ADDRESS`.
    pub bind_address: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            if value.is_some() { "<set>" } else { "<unset>" }
        }

        f.debug_struct("Settings")
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("gemini_model", &self.gemini_model)
            .field("razorpay_key_id", &self.razorpay_key_id)
            .field("razorpay_key_secret", &redact(&self.razorpay_key_secret))
            .field("razorpay_webhook_secret", &redact(&self.razorpay_webhook_secret))
            .field("stripe_secret_key", &redact(&self.stripe_secret_key))
            .field("bind_address", &self.bind_address)
            .finish()
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary lookup function.
    ///
    /// Blank values count as unset.
    ///
    /// ```
    /// use timeloop::Settings;
    ///
    /// let settings = Settings::from_lookup(|name| match name {
    ///     "GEMINI_API_KEY" => Some("key".to_string()),
    ///     "STRIPE_SECRET_KEY" => Some("   ".to_string()),
    ///     _ => None,
    /// });
    /// assert_eq!(settings.gemini_api_key.as_deref(), Some("key"));
    /// assert_eq!(settings.stripe_secret_key, None);
    /// assert_eq!(settings.gemini_model, "gemini-2.5-flash");
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            razorpay_key_id: get("RAZORPAY_KEY_ID"),
            razorpay_key_secret: get("RAZORPAY_KEY_SECRET"),
            razorpay_webhook_secret: get("RAZORPAY_WEBHOOK_SECRET"),
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            bind_address: get("TIMELOOP_BIND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
        }
    }

    /// Return `value` or a configuration error naming `variable`.
    #[cfg_attr(
        not(any(feature = "analysis", feature = "payments")),
        allow(dead_code)
    )]
    pub(crate) fn require<'a>(
        value: &'a Option<String>,
        variable: &str,
    ) -> Result<&'a str, TimeloopError> {
        value
            .as_deref()
            .ok_or_else(|| TimeloopError::Configuration(format!("{variable} not configured")))
    }
}
