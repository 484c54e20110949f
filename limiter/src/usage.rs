use chrono::{DateTime, Utc};
use common::{error::Res, quota::QuotaUsage};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::QuotaEngine;

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub is_premium: bool,
    pub daily_usage: QuotaUsage,
    pub total_extractions: i64,
}

impl QuotaEngine {
    /// Usage view for the account page. Writes nothing to the usage counters.
    pub async fn get_usage(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<UsageSummary> {
        let is_premium = self.resolver().resolve_current_premium(user_id, now).await?;
        let daily = self.user_tracker().get_usage_summary(user_id, now).await?;
        let total_extractions = self.user_tracker().store().total_extractions(user_id).await?;

        let daily_usage = if is_premium {
            QuotaUsage::unlimited(daily.current)
        } else {
            daily
        };

        Ok(UsageSummary {
            is_premium,
            daily_usage,
            total_extractions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::tests::{FakeEntitlements, engine},
        user::tests::{FakeUsageStore, t0},
        window::QuotaWindow,
    };
    use chrono::Duration;
    use common::{error::AppError, quota::Allowance};
    use std::sync::Arc;

    #[tokio::test]
    async fn premium_usage_is_unlimited() {
        let user_id = Uuid::new_v4();
        let usage = FakeUsageStore::with_user(user_id, QuotaWindow { count: 2, started_at: t0() });
        let entitlements = Arc::new(FakeEntitlements::default());
        entitlements.users.lock().unwrap().insert(user_id, (true, true));

        let summary = engine(usage, entitlements).get_usage(user_id, t0()).await.unwrap();
        assert!(summary.is_premium);
        assert_eq!(summary.daily_usage.limit, Allowance::Unlimited);
        assert_eq!(summary.daily_usage.remaining, Allowance::Unlimited);
        assert_eq!(summary.daily_usage.current, 2);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["daily_usage"]["limit"], "unlimited");
    }

    #[tokio::test]
    async fn free_usage_reports_elapsed_window_as_empty() {
        let user_id = Uuid::new_v4();
        let stale = QuotaWindow {
            count: 4,
            started_at: t0() - Duration::hours(26),
        };
        let usage = FakeUsageStore::with_user(user_id, stale);
        let entitlements = Arc::new(FakeEntitlements::default());
        entitlements.users.lock().unwrap().insert(user_id, (false, false));

        let summary = engine(usage.clone(), entitlements)
            .get_usage(user_id, t0())
            .await
            .unwrap();
        assert_eq!(summary.daily_usage, QuotaUsage::limited(0, 5, 24));
        assert_eq!(usage.window(user_id), stale);
    }

    #[tokio::test]
    async fn deleted_user_is_not_found() {
        let usage = Arc::new(FakeUsageStore::default());
        let entitlements = Arc::new(FakeEntitlements::default());
        let err = engine(usage, entitlements)
            .get_usage(Uuid::new_v4(), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
