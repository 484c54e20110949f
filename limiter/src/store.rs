use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::Res;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{user::UsageStore, window::QuotaWindow};

/// Daily counters kept on the `users` row.
#[derive(Clone)]
pub struct PgUsageStore {
    pool: Arc<PgPool>,
}

impl PgUsageStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn load_window(&self, user_id: Uuid) -> Res<Option<QuotaWindow>> {
        let counter = db::user::get_usage_counter(self.pool.as_ref(), user_id).await?;
        Ok(counter.map(|counter| QuotaWindow {
            count: counter.daily_extractions_count as i64,
            started_at: counter.last_extraction_reset,
        }))
    }

    async fn reset_window(
        &self,
        user_id: Uuid,
        expected_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Res<bool> {
        db::user::reset_usage_window(self.pool.as_ref(), user_id, expected_start, now).await
    }

    async fn increment(&self, user_id: Uuid) -> Res<bool> {
        db::user::increment_usage(self.pool.as_ref(), user_id).await
    }

    async fn total_extractions(&self, user_id: Uuid) -> Res<i64> {
        db::extraction::count_for_user(self.pool.as_ref(), user_id).await
    }
}
