use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::error::Res;
use db::{dtos::subscription::SubscriptionCreateRequest, models::subscription::Subscription};
use uuid::Uuid;

use crate::services::{
    entitlement::{EntitlementState, EntitlementStore},
    purchase::BillingStore,
};

/// Fixed origin shifted by `hours`.
pub fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
}

#[derive(Default)]
struct State {
    users: HashMap<Uuid, bool>,
    subscriptions: Vec<Subscription>,
    premium_writes: usize,
    grants: usize,
}

#[derive(Default)]
pub struct FakeBillingStore {
    state: Mutex<State>,
}

impl FakeBillingStore {
    pub fn add_user(&self, is_premium: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().users.insert(id, is_premium);
        id
    }

    pub fn add_subscription(
        &self,
        user_id: Uuid,
        product_id: &str,
        status: &str,
        end_date: Option<DateTime<Utc>>,
    ) -> Uuid {
        let mut state = self.state.lock().unwrap();
        let created_at = at(-100) + Duration::seconds(state.subscriptions.len() as i64);
        let sub = Subscription {
            id: Uuid::new_v4(),
            user_id,
            product_id: product_id.to_string(),
            purchase_token: Uuid::new_v4().to_string(),
            order_id: None,
            status: status.to_string(),
            start_date: created_at,
            end_date,
            auto_renewing: true,
            created_at,
            updated_at: created_at,
        };
        let id = sub.id;
        state.subscriptions.push(sub);
        id
    }

    pub fn is_premium(&self, user_id: Uuid) -> bool {
        self.state.lock().unwrap().users[&user_id]
    }

    pub fn subscription(&self, id: Uuid) -> Subscription {
        let state = self.state.lock().unwrap();
        state
            .subscriptions
            .iter()
            .find(|sub| sub.id == id)
            .cloned()
            .unwrap()
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().unwrap().subscriptions.len()
    }

    pub fn premium_writes(&self) -> usize {
        self.state.lock().unwrap().premium_writes
    }

    pub fn grants(&self) -> usize {
        self.state.lock().unwrap().grants
    }
}

#[async_trait]
impl EntitlementStore for FakeBillingStore {
    async fn load(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<Option<EntitlementState>> {
        let state = self.state.lock().unwrap();
        Ok(state.users.get(&user_id).map(|cached| EntitlementState {
            cached: *cached,
            live: state
                .subscriptions
                .iter()
                .any(|sub| sub.user_id == user_id && sub.is_live_at(now)),
        }))
    }

    async fn grant_if_live(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<bool> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let live = state
            .subscriptions
            .iter()
            .any(|sub| sub.user_id == user_id && sub.is_live_at(now));
        match state.users.get_mut(&user_id) {
            Some(cached) if !*cached && live => {
                *cached = true;
                state.premium_writes += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_lapsed(&self, user_id: Uuid, now: DateTime<Utc>) -> Res<Vec<Subscription>> {
        let mut state = self.state.lock().unwrap();
        let mut expired = Vec::new();
        for sub in state
            .subscriptions
            .iter_mut()
            .filter(|sub| sub.user_id == user_id && sub.is_lapsed_at(now))
        {
            sub.status = "expired".to_string();
            expired.push(sub.clone());
        }
        if !expired.is_empty() {
            let still_entitled = state
                .subscriptions
                .iter()
                .any(|sub| sub.user_id == user_id && sub.grants_access_at(now));
            state.users.insert(user_id, still_entitled);
        }
        Ok(expired)
    }
}

#[async_trait]
impl BillingStore for FakeBillingStore {
    async fn find_by_token(&self, purchase_token: &str) -> Res<Option<Subscription>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .subscriptions
            .iter()
            .find(|sub| sub.purchase_token == purchase_token)
            .cloned())
    }

    async fn insert_with_grant(&self, data: SubscriptionCreateRequest) -> Res<Subscription> {
        let mut state = self.state.lock().unwrap();
        let sub = Subscription {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            product_id: data.product_id,
            purchase_token: data.purchase_token,
            order_id: data.order_id,
            status: "active".to_string(),
            start_date: data.start_date,
            end_date: data.end_date,
            auto_renewing: data.auto_renewing,
            created_at: data.start_date,
            updated_at: data.start_date,
        };
        state.subscriptions.push(sub.clone());
        state.users.insert(data.user_id, true);
        state.grants += 1;
        Ok(sub)
    }

    async fn latest_active(&self, user_id: Uuid) -> Res<Option<Subscription>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .subscriptions
            .iter()
            .filter(|sub| sub.user_id == user_id && sub.status == "active")
            .max_by_key(|sub| sub.created_at)
            .cloned())
    }

    async fn cancel_active(&self, user_id: Uuid) -> Res<Vec<Subscription>> {
        let mut state = self.state.lock().unwrap();
        let mut cancelled = Vec::new();
        for sub in state
            .subscriptions
            .iter_mut()
            .filter(|sub| sub.user_id == user_id && sub.status == "active")
        {
            sub.status = "cancelled".to_string();
            sub.auto_renewing = false;
            cancelled.push(sub.clone());
        }
        Ok(cancelled)
    }

    async fn history(&self, user_id: Uuid) -> Res<Vec<Subscription>> {
        let state = self.state.lock().unwrap();
        let mut subs: Vec<_> = state
            .subscriptions
            .iter()
            .filter(|sub| sub.user_id == user_id)
            .cloned()
            .collect();
        subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subs)
    }
}
