use serde::{Serialize, Serializer};

/// Upper bound of a quota: a concrete count, or no bound at all for premium users.
///
/// Serialized as a plain number or as the string `"unlimited"`, which is what
/// clients render in their usage widgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    Limited(i64),
    Unlimited,
}

impl Allowance {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Allowance::Unlimited)
    }
}

impl Serialize for Allowance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Allowance::Limited(value) => serializer.serialize_i64(*value),
            Allowance::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

/// Snapshot of a caller's position inside the current quota window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub current: i64,
    pub limit: Allowance,
    pub remaining: Allowance,
    pub hours_until_reset: i64,
}

impl QuotaUsage {
    /// Usage for a bounded quota. `remaining` never goes below zero.
    pub fn limited(current: i64, limit: i64, hours_until_reset: i64) -> Self {
        Self {
            current,
            limit: Allowance::Limited(limit),
            remaining: Allowance::Limited((limit - current).max(0)),
            hours_until_reset,
        }
    }

    pub fn unlimited(current: i64) -> Self {
        Self {
            current,
            limit: Allowance::Unlimited,
            remaining: Allowance::Unlimited,
            hours_until_reset: 0,
        }
    }

    /// Usage as it will look once the pending extraction has been counted.
    pub fn after_one_more(&self) -> Self {
        let remaining = match self.remaining {
            Allowance::Limited(value) => Allowance::Limited((value - 1).max(0)),
            Allowance::Unlimited => Allowance::Unlimited,
        };
        Self {
            current: self.current + 1,
            limit: self.limit,
            remaining,
            hours_until_reset: self.hours_until_reset,
        }
    }
}

/// Which bucket refused the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuotaScope {
    GuestLimitReached,
    DailyLimitReached,
}

/// Structured guidance returned to clients whose extraction was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaDenial {
    pub scope: QuotaScope,
    pub message: String,
    pub usage: QuotaUsage,
}

impl QuotaDenial {
    pub fn retry_after_hours(&self) -> i64 {
        self.usage.hours_until_reset
    }
}
