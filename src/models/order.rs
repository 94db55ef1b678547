use serde::{Deserialize, Serialize};

/// Order payment status.
///
/// `Pending` is the only non-terminal state. Once an order reaches `Paid`,
/// `Failed`, or `Expired` it never transitions again; repeated transitions to
/// the same terminal state are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Expired => "EXPIRED",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "PAID" => Ok(OrderStatus::Paid),
            "FAILED" => Ok(OrderStatus::Failed),
            "EXPIRED" => Ok(OrderStatus::Expired),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopOrder {
    pub id: String,
    pub user_id: String,
    pub product_id: String,
    pub product_name: String,
    /// Amount in minor currency units (e.g. cents).
    pub amount_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub stripe_checkout_session_id: String,
    /// Unknown until the gateway reports it (webhook or reconciliation).
    pub stripe_payment_intent_id: Option<String>,
    /// Caller-supplied idempotency key, already scoped to the owning user.
    #[serde(skip_serializing)]
    pub idempotency_key: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Catalog entry for a purchasable product.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopProduct {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutSessionRequest {
    pub product_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionResponse {
    pub checkout_url: String,
    pub session_id: String,
}

/// Input for persisting a freshly created order.
#[derive(Debug)]
pub struct CreateOrder {
    pub user_id: String,
    pub product_id: String,
    pub product_name: String,
    pub amount_cents: i64,
    pub currency: String,
    pub stripe_checkout_session_id: String,
    pub stripe_payment_intent_id: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Record of an already-handled gateway event. Row existence is the sole
/// source of truth for webhook deduplication.
#[derive(Debug, Clone)]
pub struct ProcessedStripeEvent {
    pub event_id: String,
    pub event_type: String,
    pub processed_at: i64,
}
