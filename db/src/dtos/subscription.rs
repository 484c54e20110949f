use chrono::{DateTime, Utc};
use uuid::Uuid;

pub struct SubscriptionCreateRequest {
    pub user_id: Uuid,
    pub product_id: String,
    pub purchase_token: String,
    pub order_id: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub auto_renewing: bool,
}
