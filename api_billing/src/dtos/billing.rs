use db::models::subscription::Subscription;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPurchaseRequest {
    #[serde(default, alias = "purchaseToken")]
    pub purchase_token: String,
    #[serde(default, alias = "productId")]
    pub product_id: String,
    #[serde(default, alias = "orderId")]
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    pub subscription: Option<Subscription>,
    pub is_premium: bool,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionMessage {
    pub message: String,
    pub subscription: Subscription,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionHistory {
    pub subscriptions: Vec<Subscription>,
}
