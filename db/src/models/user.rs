use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub google_id: String,
    pub email: String,
    pub name: String,
    pub picture_url: Option<String>,
    /// Denormalized entitlement. Read it through the entitlement resolver.
    pub is_premium: bool,
    pub premium_expires_at: Option<DateTime<Utc>>,
    pub daily_extractions_count: i32,
    pub last_extraction_reset: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted daily counter of a user together with the start of its window.
#[derive(Debug, Clone, Copy, sqlx::FromRow, Serialize)]
pub struct UsageCounter {
    pub daily_extractions_count: i32,
    pub last_extraction_reset: DateTime<Utc>,
}

/// Cached entitlement flag next to whether a live subscription backs it.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct PremiumState {
    pub is_premium: bool,
    pub has_live_subscription: bool,
}
