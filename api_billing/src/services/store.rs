use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::Res;
use db::{dtos::subscription::SubscriptionCreateRequest, models::subscription::Subscription};
use sqlx::PgPool;
use uuid::Uuid;

use crate::services::{
    entitlement::{EntitlementState, EntitlementStore},
    purchase::BillingStore,
};

/// Postgres backed billing and entitlement storage.
#[derive(Clone)]
pub struct PgBillingStore {
    pool: Arc<PgPool>,
}

impl PgBillingStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementStore for PgBillingStore {
    async fn load(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<Option<EntitlementState>> {
        let state = db::user::get_premium_state(self.pool.as_ref(), user_id, now).await?;
        Ok(state.map(|state| EntitlementState {
            cached: state.is_premium,
            live: state.has_live_subscription,
        }))
    }

    async fn grant_if_live(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<bool> {
        let mut tx = self.pool.begin().await?;
        if !db::user::lock_user(&mut *tx, user_id).await? {
            return Ok(false);
        }
        let granted = db::user::grant_premium_if_live(&mut *tx, user_id, now).await?;
        tx.commit().await?;
        Ok(granted)
    }

    async fn expire_lapsed(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<Vec<Subscription>> {
        let mut tx = self.pool.begin().await?;
        db::user::lock_user(&mut *tx, user_id).await?;
        let expired = db::subscription::expire_lapsed(&mut *tx, user_id, now).await?;
        if !expired.is_empty() {
            db::user::refresh_premium_after_expiry(&mut *tx, user_id, now).await?;
        }
        tx.commit().await?;
        Ok(expired)
    }
}

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn find_by_token(&self, purchase_token: &str) -> Res<Option<Subscription>> {
        db::subscription::find_by_purchase_token(self.pool.as_ref(), purchase_token).await
    }

    async fn insert_with_grant(&self, data: SubscriptionCreateRequest) -> Res<Subscription> {
        let mut tx = self.pool.begin().await?;
        let user_id = data.user_id;
        let end_date = data.end_date;
        let subscription = db::subscription::insert_subscription(&mut *tx, data).await?;
        db::user::grant_premium(&mut *tx, user_id, end_date).await?;
        tx.commit().await?;
        Ok(subscription)
    }

    async fn latest_active(&self, user_id: Uuid) -> Res<Option<Subscription>> {
        db::subscription::get_latest_active(self.pool.as_ref(), user_id).await
    }

    async fn cancel_active(&self, user_id: Uuid) -> Res<Vec<Subscription>> {
        db::subscription::cancel_active(self.pool.as_ref(), user_id).await
    }

    async fn history(&self, user_id: Uuid) -> Res<Vec<Subscription>> {
        db::subscription::list_for_user(self.pool.as_ref(), user_id).await
    }
}
