use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Accounts (identity - owns orders and tokens)
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            email_verified INTEGER NOT NULL DEFAULT 0,
            stripe_customer_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);

        -- Orders: one row per checkout session, status driven by webhooks
        -- and the reconciliation sweep. PENDING is the only non-terminal
        -- status; transitions are guarded by "WHERE status = 'PENDING'".
        CREATE TABLE IF NOT EXISTS shop_orders (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('PENDING', 'PAID', 'FAILED', 'EXPIRED')),
            stripe_checkout_session_id TEXT NOT NULL,
            stripe_payment_intent_id TEXT,
            idempotency_key TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_shop_orders_user ON shop_orders(user_id);
        CREATE INDEX IF NOT EXISTS idx_shop_orders_session ON shop_orders(stripe_checkout_session_id);
        CREATE INDEX IF NOT EXISTS idx_shop_orders_intent ON shop_orders(stripe_payment_intent_id);
        CREATE INDEX IF NOT EXISTS idx_shop_orders_status_updated ON shop_orders(status, updated_at);
        -- Idempotency keys are unique per owning user, enforced here rather
        -- than in application logic.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_shop_orders_idempotency
            ON shop_orders(user_id, idempotency_key)
            WHERE idempotency_key IS NOT NULL;

        -- Handled webhook events. A row is written only after the order
        -- transition succeeded; existence means "already processed".
        CREATE TABLE IF NOT EXISTS processed_stripe_events (
            event_id TEXT PRIMARY KEY,
            event_type TEXT NOT NULL,
            processed_at INTEGER NOT NULL
        );

        -- Per-IP request counters (1-minute fixed window)
        CREATE TABLE IF NOT EXISTS auth_rate_limit_buckets (
            ip_address TEXT PRIMARY KEY,
            window_start INTEGER NOT NULL,
            request_count INTEGER NOT NULL
        );

        -- Brute-force lockout per username|ip composite key
        CREATE TABLE IF NOT EXISTS auth_login_locks (
            lock_key TEXT PRIMARY KEY,
            window_start INTEGER NOT NULL,
            failure_count INTEGER NOT NULL,
            locked_until INTEGER
        );

        -- Single-use purpose-scoped tokens. Only the SHA-256 hex hash of the
        -- raw secret is stored.
        CREATE TABLE IF NOT EXISTS user_tokens (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            purpose TEXT NOT NULL CHECK (purpose IN ('EMAIL_VERIFICATION', 'PASSWORD_RESET', 'REFRESH_SESSION')),
            token_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            used_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_user_tokens_hash ON user_tokens(token_hash, purpose);
        CREATE INDEX IF NOT EXISTS idx_user_tokens_user ON user_tokens(user_id, purpose);
        "#,
    )
}
