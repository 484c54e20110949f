use std::sync::Arc;

use async_trait::async_trait;
use common::error::Res;
use db::{
    dtos::extraction::{ExtractionCreateRequest, HistoryFilter},
    models::extraction::{Extraction, ExtractionStats},
};
use sqlx::PgPool;
use uuid::Uuid;

/// Extraction history of signed-in users.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record(&self, data: ExtractionCreateRequest) -> Res<Extraction>;

    /// One page of history plus the total number of rows matching the filter.
    async fn list(&self, filter: &HistoryFilter) -> Res<(Vec<Extraction>, i64)>;

    async fn get(&self, user_id: Uuid, extraction_id: Uuid) -> Res<Extraction>;

    async fn delete(&self, user_id: Uuid, extraction_id: Uuid) -> Res<()>;

    async fn delete_all(&self, user_id: Uuid) -> Res<u64>;

    async fn stats(&self, user_id: Uuid) -> Res<ExtractionStats>;
}

pub struct PgHistoryStore {
    pool: Arc<PgPool>,
}

impl PgHistoryStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn record(&self, data: ExtractionCreateRequest) -> Res<Extraction> {
        db::extraction::insert_extraction(&*self.pool, data).await
    }

    async fn list(&self, filter: &HistoryFilter) -> Res<(Vec<Extraction>, i64)> {
        let extractions = db::extraction::list_history(&*self.pool, filter).await?;
        let total = db::extraction::count_history(&*self.pool, filter).await?;
        Ok((extractions, total))
    }

    async fn get(&self, user_id: Uuid, extraction_id: Uuid) -> Res<Extraction> {
        db::extraction::get_extraction(&*self.pool, user_id, extraction_id).await
    }

    async fn delete(&self, user_id: Uuid, extraction_id: Uuid) -> Res<()> {
        db::extraction::delete_extraction(&*self.pool, user_id, extraction_id).await
    }

    async fn delete_all(&self, user_id: Uuid) -> Res<u64> {
        db::extraction::delete_all_extractions(&*self.pool, user_id).await
    }

    async fn stats(&self, user_id: Uuid) -> Res<ExtractionStats> {
        db::extraction::get_stats(&*self.pool, user_id).await
    }
}
