//! Outbound notification mail.
//!
//! Two modes: send via the Resend API when an API key is configured, or
//! log-only (development default). Every send is best-effort - order and
//! webhook processing never fail because a mail could not be delivered.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{ShopOrder, User};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

#[derive(Clone)]
pub struct Mailer {
    api_key: Option<String>,
    from_email: String,
    frontend_base_url: String,
    client: Client,
}

impl Mailer {
    pub fn new(api_key: Option<String>, from_email: String, frontend_base_url: String) -> Self {
        Self {
            api_key,
            from_email,
            frontend_base_url,
            client: Client::new(),
        }
    }

    async fn deliver(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let Some(ref api_key) = self.api_key else {
            tracing::info!(to = %to, subject = %subject, "email sender=log body={}", body);
            return Ok(());
        };

        let request = ResendEmailRequest {
            from: &self.from_email,
            to: vec![to],
            subject,
            text: body,
        };

        let response = self
            .client
            .post(RESEND_API_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Email service error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Email service error: {} - {}",
                status, body
            )));
        }

        let _result: ResendEmailResponse = response
            .json()
            .await
            .map_err(|_| AppError::Internal("Email service response error".into()))?;
        Ok(())
    }

    /// Best-effort send; failures are logged and swallowed.
    async fn deliver_best_effort(&self, to: &str, subject: &str, body: &str) {
        if let Err(e) = self.deliver(to, subject, body).await {
            tracing::warn!(to = %to, subject = %subject, "failed to send email: {}", e);
        }
    }

    pub async fn send_order_pending(&self, user: &User, order: &ShopOrder) {
        let subject = "Storefront purchase received: pending";
        let body = format!(
            "Hi {},\n\nWe received your order for {}.\nOrder status: PENDING\nOrder id: {}\n\nWe will email you again when payment is confirmed.",
            user.username, order.product_name, order.id
        );
        self.deliver_best_effort(&user.email, subject, &body).await;
    }

    pub async fn send_order_paid(&self, user: &User, order: &ShopOrder) {
        let subject = "Storefront purchase confirmed";
        let body = format!(
            "Hi {},\n\nPayment was confirmed for your order.\nProduct: {}\nOrder id: {}\nStatus: PAID\n\nThank you for your purchase!",
            user.username, order.product_name, order.id
        );
        self.deliver_best_effort(&user.email, subject, &body).await;
    }

    pub async fn send_order_failed(&self, user: &User, order: &ShopOrder) {
        let subject = "Storefront purchase failed";
        let body = format!(
            "Hi {},\n\nYour payment for {} did not complete.\nOrder id: {}\nStatus: FAILED\n\nYou can try checkout again from the shop.",
            user.username, order.product_name, order.id
        );
        self.deliver_best_effort(&user.email, subject, &body).await;
    }

    pub async fn send_verification_email(&self, to_email: &str, username: &str, token: &str) {
        let verify_link = format!("{}/verify-email?token={}", self.frontend_base_url, token);
        let subject = "Verify your Storefront account";
        let body = format!(
            "Hi {},\n\nPlease verify your email by opening this link:\n{}\n\nIf you did not sign up, you can ignore this email.",
            username, verify_link
        );
        self.deliver_best_effort(to_email, subject, &body).await;
    }

    pub async fn send_password_reset_email(&self, to_email: &str, username: &str, token: &str) {
        let reset_link = format!("{}/reset-password?token={}", self.frontend_base_url, token);
        let subject = "Reset your Storefront password";
        let body = format!(
            "Hi {},\n\nWe received a request to reset your password. Open this link:\n{}\n\nIf you did not request this, you can ignore this email.",
            username, reset_link
        );
        self.deliver_best_effort(to_email, subject, &body).await;
    }
}
