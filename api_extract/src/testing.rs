use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use api_billing::{
    EntitlementResolver, EntitlementStore, services::entitlement::EntitlementState,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::error::{AppError, Res};
use db::{
    dtos::extraction::{ExtractionCreateRequest, HistoryFilter},
    models::{
        extraction::{Extraction, ExtractionStats},
        subscription::Subscription,
    },
};
use limiter::{
    GuestQuotaTracker, InMemoryGuestStore, QuotaEngine,
    user::{UsageStore, UserQuotaTracker},
    window::{QuotaWindow, daily_window},
};
use uuid::Uuid;

use crate::services::{
    history::HistoryStore,
    provider::TableExtractor,
    table::{ImagePayload, TableData},
};

pub fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
}

pub fn sample_table() -> TableData {
    TableData {
        headers: vec!["Name".to_string(), "Qty".to_string()],
        rows: vec![
            vec!["Bolts".to_string(), "12".to_string()],
            vec!["Nuts".to_string(), "".to_string()],
        ],
    }
}

pub struct FakeExtractor {
    reply: Option<TableData>,
}

impl FakeExtractor {
    pub fn ok(table: TableData) -> Self {
        Self { reply: Some(table) }
    }

    pub fn failing() -> Self {
        Self { reply: None }
    }
}

#[async_trait]
impl TableExtractor for FakeExtractor {
    async fn extract(&self, _image: &ImagePayload) -> Res<TableData> {
        self.reply
            .clone()
            .ok_or_else(|| AppError::ExtractionFailed("no table found".to_string()))
    }
}

#[derive(Default)]
pub struct FakeHistory {
    rows: Mutex<Vec<Extraction>>,
    filters: Mutex<Vec<HistoryFilter>>,
}

impl FakeHistory {
    pub fn rows(&self) -> Vec<Extraction> {
        self.rows.lock().unwrap().clone()
    }

    pub fn filters(&self) -> Vec<HistoryFilter> {
        self.filters.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryStore for FakeHistory {
    async fn record(&self, data: ExtractionCreateRequest) -> Res<Extraction> {
        let row = Extraction {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            module_type: data.module_type,
            image_preview: data.image_preview,
            extracted_data: data.extracted_data,
            processing_time_ms: data.processing_time_ms,
            success: data.success,
            error_message: data.error_message,
            created_at: Utc::now(),
        };
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn list(&self, filter: &HistoryFilter) -> Res<(Vec<Extraction>, i64)> {
        self.filters.lock().unwrap().push(filter.clone());
        let mut matching: Vec<Extraction> = self
            .rows()
            .into_iter()
            .filter(|row| row.user_id == filter.user_id)
            .filter(|row| filter.created_after.is_none_or(|after| row.created_at >= after))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn get(&self, user_id: Uuid, extraction_id: Uuid) -> Res<Extraction> {
        self.rows()
            .into_iter()
            .find(|row| row.id == extraction_id && row.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Extraction not found".to_string()))
    }

    async fn delete(&self, user_id: Uuid, extraction_id: Uuid) -> Res<()> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|row| !(row.id == extraction_id && row.user_id == user_id));
        if rows.len() == before {
            return Err(AppError::NotFound("Extraction not found".to_string()));
        }
        Ok(())
    }

    async fn delete_all(&self, user_id: Uuid) -> Res<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|row| row.user_id != user_id);
        Ok((before - rows.len()) as u64)
    }

    async fn stats(&self, user_id: Uuid) -> Res<ExtractionStats> {
        let rows: Vec<Extraction> = self
            .rows()
            .into_iter()
            .filter(|row| row.user_id == user_id)
            .collect();
        let successful: Vec<&Extraction> = rows.iter().filter(|row| row.success).collect();
        let avg = (!successful.is_empty()).then(|| {
            successful
                .iter()
                .map(|row| row.processing_time_ms as f64)
                .sum::<f64>()
                / successful.len() as f64
        });
        Ok(ExtractionStats {
            total_extractions: rows.len() as i64,
            successful_extractions: successful.len() as i64,
            failed_extractions: (rows.len() - successful.len()) as i64,
            avg_processing_time: avg,
            first_extraction: rows.iter().map(|row| row.created_at).min(),
            last_extraction: rows.iter().map(|row| row.created_at).max(),
        })
    }
}

/// Every user exists; the listed ones hold a live subscription.
struct FakeEntitlements {
    premium: HashSet<Uuid>,
}

#[async_trait]
impl EntitlementStore for FakeEntitlements {
    async fn load(&self, user_id: Uuid, _now: DateTime<Utc>) -> Res<Option<EntitlementState>> {
        let premium = self.premium.contains(&user_id);
        Ok(Some(EntitlementState {
            cached: premium,
            live: premium,
        }))
    }

    async fn grant_if_live(&self, _user_id: Uuid, _now: DateTime<Utc>) -> Res<bool> {
        Ok(false)
    }

    async fn expire_lapsed(&self, _user_id: Uuid, _now: DateTime<Utc>) -> Res<Vec<Subscription>> {
        Ok(vec![])
    }
}

pub fn resolver(premium: &[Uuid]) -> EntitlementResolver {
    EntitlementResolver::new(Arc::new(FakeEntitlements {
        premium: premium.iter().copied().collect(),
    }))
}

/// Every user starts each test with an empty window.
#[derive(Default)]
struct FreshUsage {
    counts: Mutex<std::collections::HashMap<Uuid, i64>>,
}

#[async_trait]
impl UsageStore for FreshUsage {
    async fn load_window(&self, user_id: Uuid) -> Res<Option<QuotaWindow>> {
        let count = self.counts.lock().unwrap().get(&user_id).copied().unwrap_or(0);
        Ok(Some(QuotaWindow {
            count,
            started_at: Utc::now(),
        }))
    }

    async fn reset_window(
        &self,
        _user_id: Uuid,
        _expected_start: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Res<bool> {
        Ok(true)
    }

    async fn increment(&self, user_id: Uuid) -> Res<bool> {
        *self.counts.lock().unwrap().entry(user_id).or_insert(0) += 1;
        Ok(true)
    }

    async fn total_extractions(&self, user_id: Uuid) -> Res<i64> {
        Ok(self.counts.lock().unwrap().get(&user_id).copied().unwrap_or(0))
    }
}

/// Guest limit 3, free limit 5.
pub fn quota_engine(premium: &[Uuid]) -> QuotaEngine {
    QuotaEngine::new(
        GuestQuotaTracker::new(
            Arc::new(InMemoryGuestStore::new(daily_window())),
            3,
            daily_window(),
        ),
        UserQuotaTracker::new(Arc::new(FreshUsage::default()), 5, daily_window()),
        resolver(premium),
    )
}
