use middleware::{global::IpRateLimiter, quota::QuotaGate};

pub mod admission;
pub mod engine;
pub mod guest;
pub mod guest_redis;
pub mod store;
pub mod usage;
pub mod user;
pub mod window;

pub mod middleware {
    pub mod global;
    pub mod quota;
}

pub use engine::{Identity, QuotaEngine, QuotaTicket};
pub use guest::{GuestQuotaStore, GuestQuotaTracker, InMemoryGuestStore, spawn_guest_sweeper};
pub use usage::UsageSummary;

/// Per-IP request limit for the whole API.
pub fn ip_middleware(window_secs: u64, max_requests: u32) -> IpRateLimiter {
    IpRateLimiter::new(window_secs, max_requests)
}

/// Quota gate charging anonymous extractions to the client IP.
pub fn guest_quota_middleware() -> QuotaGate {
    QuotaGate::guest()
}

/// Quota gate charging extractions to the authenticated user.
pub fn user_quota_middleware() -> QuotaGate {
    QuotaGate::user()
}
