use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{msg, AppError, Result};

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Parameters for creating a checkout session. Prices come from the
/// in-process catalog, so sessions are created with ad-hoc price_data
/// rather than dashboard-configured price ids.
#[derive(Debug)]
pub struct CreateSessionParams<'a> {
    pub customer_id: &'a str,
    pub user_id: &'a str,
    pub product_id: &'a str,
    pub product_name: &'a str,
    pub product_description: &'a str,
    pub amount_cents: i64,
    pub currency: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
    /// Forwarded as Stripe's own idempotency token so transport-level
    /// retries cannot duplicate the session.
    pub idempotency_key: &'a str,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    webhook_secret: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: String, webhook_secret: Option<String>) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            webhook_secret,
        }
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T> {
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "Stripe {} request failed: {}",
                what, error_text
            )));
        }
        response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Stripe {}: {}", what, e)))
    }

    /// Create a checkout session for a single catalog product.
    pub async fn create_checkout_session(
        &self,
        params: &CreateSessionParams<'_>,
    ) -> Result<StripeCheckoutSession> {
        let amount = params.amount_cents.to_string();
        let success_url = format!(
            "{}?checkout=success&session_id={{CHECKOUT_SESSION_ID}}",
            params.success_url
        );
        let cancel_url = format!("{}?checkout=cancel", params.cancel_url);

        let response = self
            .client
            .post(format!("{}/checkout/sessions", STRIPE_API_BASE))
            .basic_auth(&self.secret_key, None::<&str>)
            .header("Idempotency-Key", params.idempotency_key)
            .form(&[
                ("mode", "payment"),
                ("customer", params.customer_id),
                ("success_url", success_url.as_str()),
                ("cancel_url", cancel_url.as_str()),
                ("client_reference_id", params.user_id),
                ("metadata[userId]", params.user_id),
                ("metadata[productId]", params.product_id),
                ("metadata[productName]", params.product_name),
                ("line_items[0][quantity]", "1"),
                ("line_items[0][price_data][currency]", params.currency),
                ("line_items[0][price_data][unit_amount]", amount.as_str()),
                (
                    "line_items[0][price_data][product_data][name]",
                    params.product_name,
                ),
                (
                    "line_items[0][price_data][product_data][description]",
                    params.product_description,
                ),
            ])
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        Self::parse_response(response, "checkout session").await
    }

    /// Retrieve an existing checkout session by id.
    pub async fn retrieve_checkout_session(&self, session_id: &str) -> Result<StripeCheckoutSession> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", STRIPE_API_BASE, session_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        Self::parse_response(response, "checkout session").await
    }

    /// Retrieve a payment intent by id.
    pub async fn retrieve_payment_intent(&self, payment_intent_id: &str) -> Result<StripePaymentIntent> {
        let response = self
            .client
            .get(format!("{}/payment_intents/{}", STRIPE_API_BASE, payment_intent_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        Self::parse_response(response, "payment intent").await
    }

    /// Create a gateway customer for a user.
    pub async fn create_customer(
        &self,
        email: &str,
        name: &str,
        user_id: &str,
    ) -> Result<StripeCustomer> {
        let response = self
            .client
            .post(format!("{}/customers", STRIPE_API_BASE))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[
                ("email", email),
                ("name", name),
                ("metadata[userId]", user_id),
            ])
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        Self::parse_response(response, "customer").await
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    /// Stripe recommends 300 seconds (5 minutes).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    /// Verify a webhook payload against the pre-shared signing secret.
    ///
    /// Returns `Unavailable` when no webhook secret is configured; events
    /// must never be processed in that state.
    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| AppError::Unavailable(msg::WEBHOOK_SECRET_MISSING.into()))?;

        // Stripe signature format: t=timestamp,v1=signature
        let parts: Vec<&str> = signature.split(',').collect();

        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in parts {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str =
            timestamp.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;
        let sig_v1 =
            sig_v1.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;

        // Reject webhooks older than the tolerance to prevent replay of
        // captured deliveries.
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::BadRequest(msg::INVALID_TIMESTAMP_IN_SIGNATURE.into()))?;

        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }

        // Also reject timestamps from the future (clock skew tolerance: 60 seconds)
        if age < -60 {
            tracing::warn!(
                "Stripe webhook rejected: timestamp in the future (age={}s)",
                age
            );
            return Ok(false);
        }

        let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison. Signature length is not secret (always
        // 64 hex chars for SHA-256), so the length check is fine.
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}

/// Generic Stripe webhook event - object is parsed based on event_type
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ============ checkout sessions ============

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    /// Absent once a session is no longer open.
    pub url: Option<String>,
    /// "open", "complete", or "expired"
    pub status: Option<String>,
    /// "paid", "unpaid", or "no_payment_required"
    pub payment_status: Option<String>,
    pub payment_intent: Option<String>,
}

// ============ payment intents ============

#[derive(Debug, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub status: String,
}

// ============ charges ============

#[derive(Debug, Deserialize)]
pub struct StripeCharge {
    pub id: String,
    pub payment_intent: Option<String>,
}

// ============ customers ============

#[derive(Debug, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::Mac;

    fn client_with_secret(secret: &str) -> StripeClient {
        StripeClient::new("sk_test_key".into(), Some(secret.into()))
    }

    fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let client = client_with_secret("whsec_test");
        let payload = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let header = sign("whsec_test", chrono::Utc::now().timestamp(), payload);
        assert!(client.verify_webhook_signature(payload, &header).unwrap());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let client = client_with_secret("whsec_test");
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign("whsec_other", chrono::Utc::now().timestamp(), payload);
        assert!(!client.verify_webhook_signature(payload, &header).unwrap());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let client = client_with_secret("whsec_test");
        let payload = br#"{"id":"evt_1"}"#;
        let stale = chrono::Utc::now().timestamp() - 600;
        let header = sign("whsec_test", stale, payload);
        assert!(!client.verify_webhook_signature(payload, &header).unwrap());
    }

    #[test]
    fn test_malformed_header_is_bad_request() {
        let client = client_with_secret("whsec_test");
        assert!(client
            .verify_webhook_signature(b"{}", "not-a-signature")
            .is_err());
    }

    #[test]
    fn test_missing_secret_is_unavailable() {
        let client = StripeClient::new("sk_test_key".into(), None);
        let err = client
            .verify_webhook_signature(b"{}", "t=1,v1=aa")
            .unwrap_err();
        assert!(matches!(err, crate::error::AppError::Unavailable(_)));
    }
}
