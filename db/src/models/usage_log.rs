use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ApiUsage {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub endpoint: String,
    pub method: String,
    pub status_code: i32,
    pub response_time_ms: i32,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}
