use uuid::Uuid;

pub struct ApiUsageCreateRequest {
    pub user_id: Option<Uuid>,
    pub endpoint: String,
    pub method: String,
    pub status_code: i32,
    pub response_time_ms: i32,
    pub ip_address: String,
    pub user_agent: String,
}
