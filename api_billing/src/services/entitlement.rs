use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use db::models::subscription::Subscription;
use uuid::Uuid;

/// What the datastore knows about a user's entitlement at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitlementState {
    /// Denormalized `users.is_premium`.
    pub cached: bool,
    /// An active subscription without end date, or ending in the future, exists.
    pub live: bool,
}

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// `None` when the user does not exist.
    async fn load(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<Option<EntitlementState>>;

    /// Sets the cached flag if it is unset and a live subscription still exists
    /// at `now`. Checked and written under the same lock as `expire_lapsed`, so a
    /// subscription expired in between is never cached as premium.
    async fn grant_if_live(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<bool>;

    /// Marks subscriptions past their end date as expired and recomputes the
    /// cached flag, atomically. Returns the subscriptions that expired.
    async fn expire_lapsed(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<Vec<Subscription>>;
}

/// Effective premium status: a live subscription, otherwise whatever was cached.
pub fn resolve(state: EntitlementState) -> bool {
    state.live || state.cached
}

/// Derives premium status from subscription records and keeps the cached flag in line.
#[derive(Clone)]
pub struct EntitlementResolver {
    store: Arc<dyn EntitlementStore>,
}

impl EntitlementResolver {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn resolve_current_premium(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<bool> {
        self.sweep_expired(user_id, now).await?;
        let state = self.load_existing(user_id, now).await?;
        Ok(resolve(state))
    }

    /// Persists the resolved status when it differs from the cache and returns it.
    /// Running it again without intervening changes performs no write.
    pub async fn reconcile(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<bool> {
        self.sweep_expired(user_id, now).await?;
        let state = self.load_existing(user_id, now).await?;
        let resolved = resolve(state);
        if resolved == state.cached {
            return Ok(resolved);
        }

        // a live subscription and no cached flag
        if self.store.grant_if_live(user_id, now).await? {
            log::info!("Premium status of user {} reconciled to true", user_id);
            return Ok(true);
        }

        log::debug!("Premium status of user {} changed concurrently", user_id);
        let state = self.load_existing(user_id, now).await?;
        Ok(resolve(state))
    }

    /// Lazy expiry transition. Returns the subscriptions that just expired.
    pub async fn sweep_expired(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<Vec<Subscription>> {
        let expired = self.store.expire_lapsed(user_id, now).await?;
        if !expired.is_empty() {
            log::info!(
                "Expired {} subscription(s) of user {}",
                expired.len(),
                user_id
            );
        }
        Ok(expired)
    }

    async fn load_existing(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<EntitlementState> {
        self.store
            .load(user_id, now)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBillingStore, at};
    use chrono::Duration;

    #[test]
    fn live_subscription_wins_over_cache() {
        assert!(resolve(EntitlementState { cached: false, live: true }));
        assert!(resolve(EntitlementState { cached: true, live: false }));
        assert!(!resolve(EntitlementState { cached: false, live: false }));
    }

    #[tokio::test]
    async fn non_expiring_subscription_resolves_true_and_is_persisted() {
        let store = Arc::new(FakeBillingStore::default());
        let user = store.add_user(false);
        store.add_subscription(user, "premium_lifetime", "active", None);
        let resolver = EntitlementResolver::new(store.clone());

        assert!(resolver.resolve_current_premium(user, at(0)).await.unwrap());
        assert!(resolver.reconcile(user, at(0)).await.unwrap());
        assert!(store.is_premium(user));
    }

    #[tokio::test]
    async fn reconcile_twice_writes_once() {
        let store = Arc::new(FakeBillingStore::default());
        let user = store.add_user(false);
        store.add_subscription(user, "premium_monthly", "active", Some(at(0) + Duration::days(30)));
        let resolver = EntitlementResolver::new(store.clone());

        resolver.reconcile(user, at(0)).await.unwrap();
        resolver.reconcile(user, at(0)).await.unwrap();
        assert_eq!(store.premium_writes(), 1);
    }

    #[tokio::test]
    async fn lapsed_subscription_expires_and_clears_flag() {
        let store = Arc::new(FakeBillingStore::default());
        let user = store.add_user(true);
        let sub = store.add_subscription(user, "premium_monthly", "active", Some(at(0) - Duration::hours(1)));
        let resolver = EntitlementResolver::new(store.clone());

        assert!(!resolver.reconcile(user, at(0)).await.unwrap());
        assert_eq!(store.subscription(sub).status, "expired");
        assert!(!store.is_premium(user));
    }

    #[tokio::test]
    async fn cancelled_subscription_keeps_access_until_end_date() {
        let store = Arc::new(FakeBillingStore::default());
        let user = store.add_user(true);
        store.add_subscription(user, "premium_monthly", "cancelled", Some(at(0) + Duration::days(3)));
        let resolver = EntitlementResolver::new(store.clone());

        assert!(resolver.resolve_current_premium(user, at(0)).await.unwrap());
        assert!(
            !resolver
                .resolve_current_premium(user, at(0) + Duration::days(4))
                .await
                .unwrap()
        );
    }

    /// Runs a concurrent sweep right before each grant.
    struct SweepBeforeGrant {
        inner: Arc<FakeBillingStore>,
        sweep_at: DateTime<Utc>,
    }

    #[async_trait]
    impl EntitlementStore for SweepBeforeGrant {
        async fn load(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<Option<EntitlementState>> {
            self.inner.load(user_id, now).await
        }

        async fn grant_if_live(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<bool> {
            self.inner.expire_lapsed(user_id, self.sweep_at).await?;
            self.inner.grant_if_live(user_id, now).await
        }

        async fn expire_lapsed(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<Vec<Subscription>> {
            self.inner.expire_lapsed(user_id, now).await
        }
    }

    #[tokio::test]
    async fn expiry_between_load_and_grant_does_not_leave_user_premium() {
        let store = Arc::new(FakeBillingStore::default());
        let user = store.add_user(false);
        let sub = store.add_subscription(
            user,
            "premium_monthly",
            "active",
            Some(at(0) + Duration::milliseconds(1)),
        );
        let resolver = EntitlementResolver::new(Arc::new(SweepBeforeGrant {
            inner: store.clone(),
            sweep_at: at(1),
        }));

        assert!(!resolver.reconcile(user, at(0)).await.unwrap());
        assert_eq!(store.subscription(sub).status, "expired");
        assert!(!store.is_premium(user));
        assert_eq!(store.premium_writes(), 0);

        let plain = EntitlementResolver::new(store.clone());
        assert!(
            !plain
                .resolve_current_premium(user, at(0) + Duration::days(60))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let resolver = EntitlementResolver::new(Arc::new(FakeBillingStore::default()));
        let err = resolver.reconcile(Uuid::new_v4(), at(0)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
