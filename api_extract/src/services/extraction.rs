use std::{sync::Arc, time::Instant};

use api_billing::EntitlementResolver;
use chrono::{DateTime, Duration, Utc};
use common::error::{AppError, Res};
use db::{
    dtos::extraction::{ExtractionCreateRequest, HistoryFilter, HistoryQuery},
    models::extraction::{Extraction, TABLE_EXTRACTION},
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    dtos::extraction::{ExtractRequest, ExtractionResult, HistoryPage, Pagination, StatsView},
    services::{
        history::HistoryStore,
        provider::TableExtractor,
        table::{self, TableData},
    },
};

const PREVIEW_CHARS: usize = 1000;
const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;
/// How far back free accounts can browse their history.
const FREE_HISTORY_DAYS: i64 = 7;

#[derive(Clone)]
pub struct ExtractionService {
    extractor: Arc<dyn TableExtractor>,
    history: Arc<dyn HistoryStore>,
    resolver: EntitlementResolver,
}

impl ExtractionService {
    pub fn new(
        extractor: Arc<dyn TableExtractor>,
        history: Arc<dyn HistoryStore>,
        resolver: EntitlementResolver,
    ) -> Self {
        Self {
            extractor,
            history,
            resolver,
        }
    }

    async fn run(&self, req: &ExtractRequest) -> Res<TableData> {
        let payload = table::validate_image(&req.image, req.mime_type.as_deref())?;
        self.extractor.extract(&payload).await
    }

    /// Anonymous extraction. Nothing is stored.
    pub async fn extract_for_guest(
        &self,
        req: &ExtractRequest,
        now: DateTime<Utc>,
    ) -> Res<ExtractionResult> {
        let started = Instant::now();
        let data = self.run(req).await?;
        Ok(result(None, data, elapsed_ms(started), now))
    }

    /// Extraction for a signed-in user. Provider outcomes, good or bad, land in
    /// the history. Invalid input is rejected before anything is recorded.
    pub async fn extract_for_user(
        &self,
        user_id: Uuid,
        req: &ExtractRequest,
    ) -> Res<ExtractionResult> {
        let started = Instant::now();
        let payload = table::validate_image(&req.image, req.mime_type.as_deref())?;
        let preview: String = req.image.chars().take(PREVIEW_CHARS).collect();

        match self.extractor.extract(&payload).await {
            Ok(data) => {
                let processing_time_ms = elapsed_ms(started);
                let extracted_data = serde_json::to_value(&data)
                    .map_err(|e| AppError::Internal(format!("Failed to serialize table: {}", e)))?;
                let record = self
                    .history
                    .record(ExtractionCreateRequest {
                        user_id,
                        module_type: TABLE_EXTRACTION.to_string(),
                        image_preview: Some(preview),
                        extracted_data,
                        processing_time_ms: stored_ms(processing_time_ms),
                        success: true,
                        error_message: None,
                    })
                    .await?;
                log::info!(
                    "User {} extracted a {}x{} table in {} ms",
                    user_id,
                    data.rows.len(),
                    data.headers.len(),
                    processing_time_ms
                );
                Ok(result(
                    Some(record.id),
                    data,
                    processing_time_ms,
                    record.created_at,
                ))
            }
            Err(error) => {
                let failure = ExtractionCreateRequest {
                    user_id,
                    module_type: TABLE_EXTRACTION.to_string(),
                    image_preview: Some(preview),
                    extracted_data: json!({}),
                    processing_time_ms: stored_ms(elapsed_ms(started)),
                    success: false,
                    error_message: Some(error.to_string()),
                };
                if let Err(record_error) = self.history.record(failure).await {
                    log::error!(
                        "Failed to record failed extraction of user {}: {}",
                        user_id,
                        record_error
                    );
                }
                Err(error)
            }
        }
    }

    /// Newest first. Free accounts only see the last week.
    pub async fn history(
        &self,
        user_id: Uuid,
        query: HistoryQuery,
        now: DateTime<Utc>,
    ) -> Res<HistoryPage> {
        let is_premium = self.resolver.resolve_current_premium(user_id, now).await?;
        let filter = history_filter(user_id, query, is_premium, now);

        let (extractions, total) = self.history.list(&filter).await?;
        Ok(HistoryPage {
            extractions,
            pagination: Pagination {
                total,
                limit: filter.limit,
                offset: filter.offset,
                has_more: total > filter.offset + filter.limit,
            },
        })
    }

    pub async fn get(&self, user_id: Uuid, extraction_id: Uuid) -> Res<Extraction> {
        self.history.get(user_id, extraction_id).await
    }

    pub async fn delete(&self, user_id: Uuid, extraction_id: Uuid) -> Res<()> {
        self.history.delete(user_id, extraction_id).await
    }

    pub async fn delete_all(&self, user_id: Uuid) -> Res<u64> {
        let deleted = self.history.delete_all(user_id).await?;
        log::info!("User {} cleared {} extraction(s)", user_id, deleted);
        Ok(deleted)
    }

    pub async fn stats(&self, user_id: Uuid) -> Res<StatsView> {
        Ok(self.history.stats(user_id).await?.into())
    }
}

fn history_filter(
    user_id: Uuid,
    query: HistoryQuery,
    is_premium: bool,
    now: DateTime<Utc>,
) -> HistoryFilter {
    HistoryFilter {
        user_id,
        module_type: query.module_type.filter(|module| !module.is_empty()),
        created_after: (!is_premium).then(|| now - Duration::days(FREE_HISTORY_DAYS)),
        limit: query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE),
        offset: query.offset.unwrap_or(0).max(0),
    }
}

fn result(
    id: Option<Uuid>,
    data: TableData,
    processing_time_ms: i64,
    created_at: DateTime<Utc>,
) -> ExtractionResult {
    ExtractionResult {
        id,
        quality: table::analyze_quality(&data),
        table: data.into(),
        processing_time_ms,
        created_at,
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

/// The history column is an INTEGER.
fn stored_ms(ms: i64) -> i32 {
    i32::try_from(ms).unwrap_or(i32::MAX)
}
