use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use db::{dtos::subscription::SubscriptionCreateRequest, models::subscription::Subscription};
use uuid::Uuid;

use crate::{
    dtos::billing::{SubscriptionView, VerifyPurchaseRequest},
    misc::plan::ProductPlan,
    services::entitlement::EntitlementResolver,
};

#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn find_by_token(&self, purchase_token: &str) -> Res<Option<Subscription>>;

    /// Inserts the subscription and grants premium to its owner in one transaction.
    async fn insert_with_grant(&self, data: SubscriptionCreateRequest) -> Res<Subscription>;

    async fn latest_active(&self, user_id: Uuid) -> Res<Option<Subscription>>;

    async fn cancel_active(&self, user_id: Uuid) -> Res<Vec<Subscription>>;

    async fn history(&self, user_id: Uuid) -> Res<Vec<Subscription>>;
}

#[derive(Clone)]
pub struct BillingService {
    store: Arc<dyn BillingStore>,
    resolver: EntitlementResolver,
}

impl BillingService {
    pub fn new(store: Arc<dyn BillingStore>, resolver: EntitlementResolver) -> Self {
        Self { store, resolver }
    }

    /// Records a store purchase and activates premium.
    ///
    /// A purchase token is applied at most once: replaying it returns
    /// [`AppError::DuplicateToken`] carrying the subscription recorded the first time.
    pub async fn verify_purchase(
        &self,
        user_id: Uuid,
        req: VerifyPurchaseRequest,
        now: DateTime<Utc>,
    ) -> Res<Subscription> {
        let purchase_token = req.purchase_token.trim().to_string();
        let product_id = req.product_id.trim().to_string();
        if purchase_token.is_empty() || product_id.is_empty() {
            return Err(AppError::BadRequest(
                "purchase_token and product_id are required".to_string(),
            ));
        }

        if let Some(existing) = self.store.find_by_token(&purchase_token).await? {
            return Err(duplicate(&existing));
        }

        // TODO: validate the token against the Google Play Developer API before granting.
        let plan = ProductPlan::from_product_id(&product_id);
        let request = SubscriptionCreateRequest {
            user_id,
            product_id,
            purchase_token: purchase_token.clone(),
            order_id: req.order_id.filter(|order_id| !order_id.is_empty()),
            start_date: now,
            end_date: plan.end_date(now)?,
            auto_renewing: plan.auto_renewing(),
        };

        match self.store.insert_with_grant(request).await {
            Ok(subscription) => {
                log::info!("Premium subscription activated for user {}", user_id);
                Ok(subscription)
            }
            // Another request registered the same token between the lookup and the insert.
            Err(error) if error.is_unique_violation() => {
                match self.store.find_by_token(&purchase_token).await? {
                    Some(existing) => Err(duplicate(&existing)),
                    None => Err(error),
                }
            }
            Err(error) => Err(error),
        }
    }

    /// Latest active subscription after applying lazy expiry. When the only active
    /// subscription just expired, that subscription is reported instead.
    pub async fn current_subscription(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Res<SubscriptionView> {
        let expired = self.resolver.sweep_expired(user_id, now).await?;
        let active = self.store.latest_active(user_id).await?;
        let is_premium = self.resolver.resolve_current_premium(user_id, now).await?;

        let subscription =
            active.or_else(|| expired.into_iter().max_by_key(|sub| sub.created_at));
        Ok(SubscriptionView {
            subscription,
            is_premium,
        })
    }

    /// Stops auto-renewal. Access continues until the end date.
    pub async fn cancel(&self, user_id: Uuid) -> Res<Subscription> {
        let cancelled = self.store.cancel_active(user_id).await?;
        let latest = cancelled
            .into_iter()
            .max_by_key(|sub| sub.created_at)
            .ok_or_else(|| AppError::NotFound("No active subscription found".to_string()))?;
        log::warn!("Subscription cancelled for user {}", user_id);
        Ok(latest)
    }

    pub async fn history(&self, user_id: Uuid) -> Res<Vec<Subscription>> {
        self.store.history(user_id).await
    }
}

fn duplicate(existing: &Subscription) -> AppError {
    match serde_json::to_value(existing) {
        Ok(subscription) => AppError::DuplicateToken(subscription),
        Err(error) => AppError::Internal(format!("Failed to serialize subscription: {}", error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBillingStore, at};
    use chrono::Duration;

    fn service(store: &Arc<FakeBillingStore>) -> BillingService {
        BillingService::new(store.clone(), EntitlementResolver::new(store.clone()))
    }

    fn purchase(token: &str, product: &str) -> VerifyPurchaseRequest {
        VerifyPurchaseRequest {
            purchase_token: token.to_string(),
            product_id: product.to_string(),
            order_id: Some("GPA.1234".to_string()),
        }
    }

    #[tokio::test]
    async fn purchase_grants_premium_with_plan_period() {
        let store = Arc::new(FakeBillingStore::default());
        let user = store.add_user(false);

        let sub = service(&store)
            .verify_purchase(user, purchase("tok-1", "premium_yearly"), at(0))
            .await
            .unwrap();

        assert_eq!(sub.status, "active");
        assert!(sub.auto_renewing);
        assert_eq!(sub.end_date, Some(at(0) + Duration::days(365)));
        assert!(store.is_premium(user));
    }

    #[tokio::test]
    async fn duplicate_token_returns_original_without_second_grant() {
        let store = Arc::new(FakeBillingStore::default());
        let user = store.add_user(false);
        let billing = service(&store);

        let original = billing
            .verify_purchase(user, purchase("tok-1", "premium_monthly"), at(0))
            .await
            .unwrap();
        let err = billing
            .verify_purchase(user, purchase("tok-1", "premium_monthly"), at(1))
            .await
            .unwrap_err();

        match err {
            AppError::DuplicateToken(subscription) => {
                assert_eq!(subscription["id"], original.id.to_string());
            }
            other => panic!("expected duplicate token, got {:?}", other),
        }
        assert_eq!(store.subscription_count(), 1);
        assert_eq!(store.grants(), 1);
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let store = Arc::new(FakeBillingStore::default());
        let user = store.add_user(false);
        let err = service(&store)
            .verify_purchase(user, purchase(" ", "premium_monthly"), at(0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn current_subscription_reports_lazily_expired_one() {
        let store = Arc::new(FakeBillingStore::default());
        let user = store.add_user(true);
        let sub = store.add_subscription(user, "premium_monthly", "active", Some(at(10)));

        let view = service(&store).current_subscription(user, at(11)).await.unwrap();
        let reported = view.subscription.unwrap();
        assert_eq!(reported.id, sub);
        assert_eq!(reported.status, "expired");
        assert!(!view.is_premium);
    }

    #[tokio::test]
    async fn cancel_without_active_subscription_is_not_found() {
        let store = Arc::new(FakeBillingStore::default());
        let user = store.add_user(false);
        let err = service(&store).cancel(user).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_turns_off_renewal_but_keeps_premium() {
        let store = Arc::new(FakeBillingStore::default());
        let user = store.add_user(false);
        let billing = service(&store);
        billing
            .verify_purchase(user, purchase("tok-9", "premium_monthly"), at(0))
            .await
            .unwrap();

        let cancelled = billing.cancel(user).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");
        assert!(!cancelled.auto_renewing);
        assert!(
            billing
                .current_subscription(user, at(1))
                .await
                .unwrap()
                .is_premium
        );
    }
}
