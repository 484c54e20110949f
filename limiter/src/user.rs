use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{
    error::{AppError, Res},
    quota::{QuotaDenial, QuotaScope, QuotaUsage},
};
use uuid::Uuid;

use crate::{
    admission::Admission,
    window::{Boundary, QuotaWindow},
};

/// Persisted per-user daily counters.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// `None` when the user does not exist.
    async fn load_window(&self, user_id: Uuid) -> Res<Option<QuotaWindow>>;

    /// Opens a fresh window at `now` unless the stored one no longer starts at
    /// `expected_start`. Returns whether the reset was written.
    async fn reset_window(
        &self,
        user_id: Uuid,
        expected_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Res<bool>;

    /// Atomic `count = count + 1`.
    async fn increment(&self, user_id: Uuid) -> Res<bool>;

    /// All history rows of the user.
    async fn total_extractions(&self, user_id: Uuid) -> Res<i64>;
}

#[derive(Clone)]
pub struct UserQuotaTracker {
    store: Arc<dyn UsageStore>,
    limit: i64,
    window: Duration,
}

impl UserQuotaTracker {
    pub fn new(store: Arc<dyn UsageStore>, limit: i64, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
        }
    }

    pub fn store(&self) -> &Arc<dyn UsageStore> {
        &self.store
    }

    async fn load(&self, user_id: Uuid) -> Res<QuotaWindow> {
        self.store
            .load_window(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Premium users are always admitted. Otherwise an elapsed window is reset
    /// durably before the count is compared with the limit.
    pub async fn check_and_admit(
        &self,
        user_id: Uuid,
        is_premium: bool,
        now: DateTime<Utc>,
    ) -> Res<Admission> {
        if is_premium {
            return Ok(Admission::Admit(QuotaUsage::unlimited(0)));
        }

        let stored = self.load(user_id).await?;
        let (mut window, reset) = stored.advance(now, self.window, Boundary::Reached);
        if reset {
            let written = self
                .store
                .reset_window(user_id, stored.started_at, now)
                .await?;
            if !written {
                // another request reset it first, use what it wrote
                window = self.load(user_id).await?;
            }
        }

        let usage = QuotaUsage::limited(
            window.count,
            self.limit,
            window.hours_until_reset(now, self.window),
        );

        if window.count >= self.limit {
            return Ok(Admission::Deny(QuotaDenial {
                scope: QuotaScope::DailyLimitReached,
                message: format!(
                    "Daily limit of {} extractions reached. Upgrade to premium for unlimited extractions.",
                    self.limit
                ),
                usage,
            }));
        }

        Ok(Admission::Admit(usage))
    }

    /// Counts a successful extraction of a free user. Failures are logged only.
    pub async fn increment(&self, user_id: Uuid, is_premium: bool) {
        if is_premium {
            return;
        }
        match self.store.increment(user_id).await {
            Ok(true) => {}
            Ok(false) => log::warn!("Usage counter of unknown user {} not incremented", user_id),
            Err(error) => log::error!(
                "Failed to increment usage counter of user {}: {}",
                user_id,
                error
            ),
        }
    }

    /// Read-only projection: an elapsed window is reported as empty, nothing is written.
    pub async fn get_usage_summary(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<QuotaUsage> {
        let (window, _) = self
            .load(user_id)
            .await?
            .advance(now, self.window, Boundary::Reached);
        Ok(QuotaUsage::limited(
            window.count,
            self.limit,
            window.hours_until_reset(now, self.window),
        ))
    }
}
