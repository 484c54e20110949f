use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::error::{AppError, Res};
use redis::Script;

use crate::{guest::GuestQuotaStore, window::QuotaWindow};

const KEY_PREFIX: &str = "guest_quota:";

/// Opens the window if needed and returns its count with the seconds left to live.
const OPEN_WINDOW: &str = r#"
redis.call('SET', KEYS[1], 0, 'NX', 'EX', ARGV[1])
local count = tonumber(redis.call('GET', KEYS[1]) or '0')
local ttl = redis.call('TTL', KEYS[1])
return {count, ttl}
"#;

/// INCR keeps the TTL, but would create a key without one if it was missing.
const INCREMENT_EXISTING: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('INCR', KEYS[1])
end
return -1
"#;

/// Guest windows shared by every instance through Redis. Windows expire on
/// their own, so there is nothing to sweep.
pub struct RedisGuestStore {
    pool: deadpool_redis::Pool,
    window_secs: i64,
}

impl RedisGuestStore {
    pub fn new(pool: deadpool_redis::Pool, window: Duration) -> Self {
        Self {
            pool,
            window_secs: window.num_seconds().max(1),
        }
    }

    fn key(ip: &str) -> String {
        format!("{}{}", KEY_PREFIX, ip)
    }

    async fn connection(&self) -> Res<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("Redis connection: {}", e)))
    }
}

fn redis_error(error: redis::RedisError) -> AppError {
    AppError::UpstreamUnavailable(format!("Redis: {}", error))
}

/// Rebuilds the window start from the remaining TTL.
fn window_from_ttl(count: i64, ttl: i64, window_secs: i64, now: DateTime<Utc>) -> QuotaWindow {
    let elapsed = if ttl < 0 {
        0
    } else {
        (window_secs - ttl).clamp(0, window_secs)
    };
    QuotaWindow {
        count,
        started_at: now - Duration::seconds(elapsed),
    }
}

#[async_trait]
impl GuestQuotaStore for RedisGuestStore {
    async fn current_window(&self, ip: &str, now: DateTime<Utc>) -> Res<QuotaWindow> {
        let mut conn = self.connection().await?;
        let (count, ttl): (i64, i64) = Script::new(OPEN_WINDOW)
            .key(Self::key(ip))
            .arg(self.window_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(window_from_ttl(count, ttl, self.window_secs, now))
    }

    async fn increment(&self, ip: &str) -> Res<bool> {
        let mut conn = self.connection().await?;
        let count: i64 = Script::new(INCREMENT_EXISTING)
            .key(Self::key(ip))
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(count >= 0)
    }

    async fn sweep(&self, _now: DateTime<Utc>) -> Res<usize> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_start_follows_remaining_ttl() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
        let window = window_from_ttl(2, 3600, 86_400, now);
        assert_eq!(window.count, 2);
        assert_eq!(window.started_at, now - Duration::hours(23));
        assert_eq!(window.hours_until_reset(now, Duration::hours(24)), 1);

        // negative TTL: key without expiry or already gone
        let window = window_from_ttl(0, -2, 86_400, now);
        assert_eq!(window.started_at, now);
    }
}
