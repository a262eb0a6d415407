use std::time::Duration;

use chrono::Utc;

/// Current wall clock time in unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Expiry timestamp `ttl` from now. Saturates rather than overflowing.
pub fn expires_in(ttl: Duration) -> i64 {
    let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_millis().saturating_add(ttl)
}

/// Whether a timestamp produced by [expires_in] has passed at `now`.
pub fn is_expired(expires: i64, now: i64) -> bool {
    expires <= now
}
