use std::env;

/// Server configuration, loaded from environment variables.
///
/// `STRIPE_SECRET_KEY` and `JWT_SECRET` are required and checked at startup;
/// everything else has a development-friendly default. The webhook secret is
/// optional here because its absence is surfaced per-request (503) by the
/// webhook endpoint rather than preventing the rest of the service from
/// running.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,

    pub stripe_secret_key: String,
    pub stripe_webhook_secret: Option<String>,
    pub jwt_secret: String,

    pub currency: String,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    pub reconcile_interval_secs: u64,

    pub max_requests_per_minute: i64,
    pub max_login_failures: i64,
    pub lock_minutes: i64,

    pub verification_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,

    pub frontend_base_url: String,
    pub resend_api_key: Option<String>,
    pub email_from: String,
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let stripe_secret_key = env::var("STRIPE_SECRET_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .expect("STRIPE_SECRET_KEY is required");

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .expect("JWT_SECRET is required");
        assert!(
            jwt_secret.len() >= 32 && !jwt_secret.contains("change_me"),
            "JWT_SECRET must be at least 32 chars and not use placeholder values"
        );

        let frontend_base_url = env::var("FRONTEND_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "storefront.db".to_string()),

            stripe_secret_key,
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            jwt_secret,

            currency: env::var("SHOP_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            checkout_success_url: env::var("SHOP_SUCCESS_URL")
                .unwrap_or_else(|_| format!("{}/shop", frontend_base_url)),
            checkout_cancel_url: env::var("SHOP_CANCEL_URL")
                .unwrap_or_else(|_| format!("{}/shop", frontend_base_url)),
            reconcile_interval_secs: env_i64("SHOP_RECONCILE_INTERVAL_SECS", 300) as u64,

            max_requests_per_minute: env_i64("AUTH_MAX_REQUESTS_PER_MINUTE", 60),
            max_login_failures: env_i64("AUTH_MAX_LOGIN_FAILURES", 5),
            lock_minutes: env_i64("AUTH_LOCK_MINUTES", 15),

            verification_ttl_minutes: env_i64("AUTH_VERIFICATION_TTL_MINUTES", 1440),
            reset_ttl_minutes: env_i64("AUTH_RESET_TTL_MINUTES", 30),
            access_token_ttl_minutes: env_i64("AUTH_ACCESS_TOKEN_TTL_MINUTES", 15),
            refresh_token_ttl_days: env_i64("AUTH_REFRESH_TOKEN_TTL_DAYS", 7),

            frontend_base_url,
            resend_api_key: env::var("RESEND_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "no-reply@localhost".to_string()),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
