use chrono::{DateTime, Utc};
use common::quota::QuotaUsage;
use db::models::extraction::{Extraction, ExtractionStats};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::table::{self, TableData, TableQuality};

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractRequest {
    /// Base64 image, optionally as a data URL.
    #[serde(default)]
    pub image: String,
    #[serde(default, alias = "mimeType")]
    pub mime_type: Option<String>,
}

/// Extracted table with its renderings.
#[derive(Debug, Clone, Serialize)]
pub struct TableView {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub markdown: String,
    pub csv: String,
    pub row_count: usize,
    pub column_count: usize,
}

impl From<TableData> for TableView {
    fn from(data: TableData) -> Self {
        let markdown = table::to_markdown(&data);
        let csv = table::to_csv(&data);
        Self {
            row_count: data.rows.len(),
            column_count: data.headers.len(),
            headers: data.headers,
            rows: data.rows,
            markdown,
            csv,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    /// History row id. Guest extractions are not stored.
    pub id: Option<Uuid>,
    pub table: TableView,
    pub quality: TableQuality,
    pub processing_time_ms: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ExtractionResponse {
    pub message: String,
    pub extraction: ExtractionResult,
    /// Usage including this extraction.
    pub usage: QuotaUsage,
}

#[derive(Debug, Serialize)]
pub struct GuestExtractionResponse {
    pub message: String,
    pub extraction: ExtractionResult,
    pub guest_mode: bool,
    pub usage: QuotaUsage,
    pub upgrade_message: String,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub extractions: Vec<Extraction>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub message: String,
    pub deleted_count: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsView {
    pub total_extractions: i64,
    pub successful_extractions: i64,
    pub failed_extractions: i64,
    /// Mean over successful extractions, rounded to whole milliseconds.
    pub avg_processing_time_ms: i64,
    pub first_extraction: Option<DateTime<Utc>>,
    pub last_extraction: Option<DateTime<Utc>>,
}

impl From<ExtractionStats> for StatsView {
    fn from(stats: ExtractionStats) -> Self {
        Self {
            total_extractions: stats.total_extractions,
            successful_extractions: stats.successful_extractions,
            failed_extractions: stats.failed_extractions,
            avg_processing_time_ms: stats.avg_processing_time.unwrap_or(0.0).round() as i64,
            first_extraction: stats.first_extraction,
            last_extraction: stats.last_extraction,
        }
    }
}
