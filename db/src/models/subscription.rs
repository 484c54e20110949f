use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: String,
    pub purchase_token: String,
    pub order_id: Option<String>,
    pub status: String,
    pub start_date: DateTime<Utc>,
    /// `None` for lifetime purchases.
    pub end_date: Option<DateTime<Utc>>,
    pub auto_renewing: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Grants access at `now`: active and not past its end date.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active.as_str()
            && self.end_date.is_none_or(|end| end > now)
    }

    /// Cancelled subscriptions keep access until their end date.
    pub fn grants_access_at(&self, now: DateTime<Utc>) -> bool {
        (self.status == SubscriptionStatus::Active.as_str()
            || self.status == SubscriptionStatus::Cancelled.as_str())
            && self.end_date.is_none_or(|end| end > now)
    }

    /// Not yet expired although its end date has passed.
    pub fn is_lapsed_at(&self, now: DateTime<Utc>) -> bool {
        self.status != SubscriptionStatus::Expired.as_str()
            && self.end_date.is_some_and(|end| end <= now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
