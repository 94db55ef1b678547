/// Per-IP request counter for the fixed-window rate limit.
#[derive(Debug, Clone)]
pub struct RateLimitBucket {
    pub ip_address: String,
    pub window_start: i64,
    pub request_count: i64,
}

/// Failure counter and lockout state for one username+IP pair.
/// The composite key is `username + "|" + ip`.
#[derive(Debug, Clone)]
pub struct LoginLock {
    pub lock_key: String,
    pub window_start: i64,
    pub failure_count: i64,
    pub locked_until: Option<i64>,
}
