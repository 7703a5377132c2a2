use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_API_BASE: &str = "https://api.razorpay.com/v1";
const RECEIPT_PREFIX: &str = "receipt_";

/// Receipt attached to every order; the webhook path resolves the appointment from it.
pub fn receipt_for(appointment_id: Uuid) -> String {
    format!("{RECEIPT_PREFIX}{appointment_id}")
}

pub fn appointment_id_from_receipt(receipt: &str) -> Option<Uuid> {
    receipt
        .trim()
        .strip_prefix(RECEIPT_PREFIX)
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
}

/// Minimal Razorpay client built on reqwest.
pub struct RazorpayClient {
    http: reqwest::Client,
    api_base: String,
    key_id: String,
    key_secret: String,
    webhook_secret: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_paid: Option<i64>,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RazorpayPayment {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub captured: bool,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl RazorpayPayment {
    pub fn is_authorized(&self) -> bool {
        self.status == "authorized"
    }

    pub fn is_captured(&self) -> bool {
        self.status == "captured"
    }
}

#[derive(Debug, Deserialize)]
pub struct RazorpayWebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: RazorpayWebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct RazorpayWebhookPayload {
    pub payment: Option<RazorpayEntityWrapper<RazorpayPayment>>,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayEntityWrapper<T> {
    pub entity: T,
}

impl RazorpayWebhookEvent {
    pub fn payment(&self) -> Option<&RazorpayPayment> {
        self.payload.payment.as_ref().map(|wrapper| &wrapper.entity)
    }
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorEnvelope {
    error: RazorpayErrorDetails,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetails {
    code: Option<String>,
    description: Option<String>,
    reason: Option<String>,
    field: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Serialize)]
struct CaptureBody<'a> {
    amount: i64,
    currency: &'a str,
}

fn hmac_hex_matches(secret: &str, message: &[u8], signature_hex: &str) -> Result<()> {
    let provided = hex::decode(signature_hex.trim()).context("signature is not hex encoded")?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(message);
    mac.verify_slice(&provided)
        .map_err(|_| anyhow::anyhow!("signature mismatch"))
}

impl RazorpayClient {
    pub fn new(key_id: String, key_secret: String, webhook_secret: String) -> Self {
        Self::with_api_base(DEFAULT_API_BASE.to_string(), key_id, key_secret, webhook_secret)
    }

    pub fn with_api_base(
        api_base: String,
        key_id: String,
        key_secret: String,
        webhook_secret: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            key_id,
            key_secret,
            webhook_secret,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let (error_code, error_description, error_reason, error_field) =
            match serde_json::from_str::<RazorpayErrorEnvelope>(&body) {
                Ok(envelope) => (
                    envelope.error.code,
                    envelope.error.description,
                    envelope.error.reason,
                    envelope.error.field,
                ),
                Err(_) => (None, None, None, None),
            };

        error!(
            status = %status,
            razorpay_error_code = ?error_code,
            razorpay_error_description = ?error_description,
            razorpay_error_reason = ?error_reason,
            razorpay_error_field = ?error_field,
            response_body = %body,
            context = %context,
            "razorpay api request failed"
        );

        anyhow::bail!("Razorpay API request failed: {} (status {})", context, status);
    }

    /// Creates an order for `amount_minor` (paise for INR).
    pub async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<RazorpayOrder> {
        let resp = self
            .http
            .post(format!("{}/orders", self.api_base))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&CreateOrderBody {
                amount: amount_minor,
                currency,
                receipt,
            })
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "create order").await?;
        Ok(resp.json().await?)
    }

    pub async fn fetch_order(&self, order_id: &str) -> Result<RazorpayOrder> {
        let resp = self
            .http
            .get(format!("{}/orders/{}", self.api_base, order_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "fetch order").await?;
        Ok(resp.json().await?)
    }

    pub async fn fetch_payment(&self, payment_id: &str) -> Result<RazorpayPayment> {
        let resp = self
            .http
            .get(format!("{}/payments/{}", self.api_base, payment_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "fetch payment").await?;
        Ok(resp.json().await?)
    }

    /// Captures an authorized payment for the full order amount.
    pub async fn capture_payment(
        &self,
        payment_id: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<RazorpayPayment> {
        let resp = self
            .http
            .post(format!("{}/payments/{}/capture", self.api_base, payment_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&CaptureBody {
                amount: amount_minor,
                currency,
            })
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "capture payment").await?;
        Ok(resp.json().await?)
    }

    /// Checkout signature: hex HMAC-SHA256 of `{order_id}|{payment_id}` keyed by the API secret.
    pub fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<()> {
        let message = format!("{order_id}|{payment_id}");
        hmac_hex_matches(&self.key_secret, message.as_bytes(), signature)
            .context("invalid payment signature")
    }

    /// Webhook signature: hex HMAC-SHA256 of the raw body keyed by the webhook secret.
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<RazorpayWebhookEvent> {
        hmac_hex_matches(&self.webhook_secret, payload, signature)
            .context("invalid webhook signature")?;

        let event: RazorpayWebhookEvent =
            serde_json::from_slice(payload).context("malformed webhook payload")?;
        Ok(event)
    }
}
