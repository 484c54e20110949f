use actix_web::{Responder, get, post, web};
use chrono::Utc;
use common::{error::Res, http::Success, jwt::JwtClaims};

use crate::{
    dtos::billing::{SubscriptionHistory, SubscriptionMessage, VerifyPurchaseRequest},
    services::purchase::BillingService,
};

/// Registers a Google Play purchase and activates premium for the caller.
///
/// # Input
/// - `claims`: JWT claims of the authenticated user
/// - `req`: JSON payload with `purchase_token`, `product_id` and an optional `order_id`
///
/// # Output
/// - Success: the created subscription
/// - Error: 400 if a field is missing, 409 with the original `subscription` if the
///   token was already registered
///
/// # Frontend Example
/// ```javascript
/// const response = await fetch('/api/billing/verify-purchase', {
///   method: 'POST',
///   headers: {
///     'Authorization': `Bearer ${token}`,
///     'Content-Type': 'application/json'
///   },
///   body: JSON.stringify({
///     purchase_token: purchase.purchaseToken,
///     product_id: 'premium_monthly',
///     order_id: purchase.orderId
///   })
/// });
///
/// if (response.status === 409) {
///   const { subscription } = await response.json();
///   console.log('Already registered:', subscription.id);
/// }
/// ```
#[post("/verify-purchase")]
pub async fn post_verify_purchase(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<VerifyPurchaseRequest>,
    billing: web::Data<BillingService>,
) -> Res<impl Responder> {
    let subscription = billing
        .verify_purchase(claims.user_id, req.into_inner(), Utc::now())
        .await?;
    Success::ok(SubscriptionMessage {
        message: "Premium subscription activated".to_string(),
        subscription,
    })
}

/// Current subscription of the caller together with the effective premium status.
#[get("/subscription")]
pub async fn get_subscription(
    claims: web::ReqData<JwtClaims>,
    billing: web::Data<BillingService>,
) -> Res<impl Responder> {
    let view = billing
        .current_subscription(claims.user_id, Utc::now())
        .await?;
    Success::ok(view)
}

#[post("/cancel")]
pub async fn post_cancel(
    claims: web::ReqData<JwtClaims>,
    billing: web::Data<BillingService>,
) -> Res<impl Responder> {
    let subscription = billing.cancel(claims.user_id).await?;
    Success::ok(SubscriptionMessage {
        message: "Subscription cancelled. Premium access remains until the end date.".to_string(),
        subscription,
    })
}

#[get("/history")]
pub async fn get_history(
    claims: web::ReqData<JwtClaims>,
    billing: web::Data<BillingService>,
) -> Res<impl Responder> {
    let subscriptions = billing.history(claims.user_id).await?;
    Success::ok(SubscriptionHistory { subscriptions })
}
