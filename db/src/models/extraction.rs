use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::JsonValue;
use uuid::Uuid;

pub const TABLE_EXTRACTION: &str = "table_extraction";

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Extraction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub module_type: String,
    #[serde(skip_serializing)]
    pub image_preview: Option<String>,
    pub extracted_data: JsonValue,
    pub processing_time_ms: i32,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ExtractionStats {
    pub total_extractions: i64,
    pub successful_extractions: i64,
    pub failed_extractions: i64,
    pub avg_processing_time: Option<f64>,
    pub first_extraction: Option<DateTime<Utc>>,
    pub last_extraction: Option<DateTime<Utc>>,
}
