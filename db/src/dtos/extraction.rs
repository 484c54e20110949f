use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::types::JsonValue;
use uuid::Uuid;

pub struct ExtractionCreateRequest {
    pub user_id: Uuid,
    pub module_type: String,
    pub image_preview: Option<String>,
    pub extracted_data: JsonValue,
    pub processing_time_ms: i32,
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub module_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HistoryFilter {
    pub user_id: Uuid,
    pub module_type: Option<String>,
    /// Only rows created after this instant, used to cap free accounts.
    pub created_after: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}
