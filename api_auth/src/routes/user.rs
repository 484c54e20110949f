use std::sync::Arc;

use actix_web::{Responder, delete, get, patch, web};
use api_billing::EntitlementResolver;
use chrono::Utc;
use common::{error::Res, http::Success, jwt::JwtClaims};
use limiter::QuotaEngine;
use sqlx::PgPool;

use crate::{
    dtos::auth::{MeResponse, MessageResponse, UpdateUserRequest, UserView},
    services,
};

/// Endpoint to retrieve the current authenticated user's profile and quota.
///
/// # Input
/// - `claims`: The JWT claims extracted from the authentication token
/// - `pool`: A database connection pool for retrieving user data
/// - `engine`: Quota engine producing the usage summary
///
/// # Output
/// - Success: the user, its lifetime extraction count and today's usage
/// - Error: 401 without a valid token, 404 if the account no longer exists
///
/// # Frontend Example
/// ```javascript
/// const response = await fetch('/api/users/me', {
///   headers: {
///     'Authorization': `Bearer ${localStorage.getItem('authToken')}`
///   }
/// });
///
/// if (response.ok) {
///   const { user, usage } = await response.json();
///   // usage.daily_usage: { current: 2, limit: 5, remaining: 3, hours_until_reset: 17 }
///   // premium users get limit: "unlimited", remaining: "unlimited"
///   console.log(user.name, usage.daily_usage.remaining);
/// }
/// ```
#[get("/me")]
pub async fn get_me(
    claims: web::ReqData<JwtClaims>,
    pool: web::Data<Arc<PgPool>>,
    engine: web::Data<QuotaEngine>,
) -> Res<impl Responder> {
    let usage = engine.get_usage(claims.user_id, Utc::now()).await?;
    let user = services::user::get_user_by_id(&pool, claims.user_id).await?;
    Success::ok(MeResponse {
        user: UserView::new(user, usage.is_premium),
        total_extractions: usage.total_extractions,
        usage,
    })
}

/// Today's quota usage of the caller. Read only.
#[get("/usage")]
pub async fn get_usage(
    claims: web::ReqData<JwtClaims>,
    engine: web::Data<QuotaEngine>,
) -> Res<impl Responder> {
    let usage = engine.get_usage(claims.user_id, Utc::now()).await?;
    Success::ok(usage)
}

#[patch("/me")]
pub async fn patch_me(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<UpdateUserRequest>,
    pool: web::Data<Arc<PgPool>>,
    resolver: web::Data<EntitlementResolver>,
) -> Res<impl Responder> {
    let name = services::user::validate_name(req.name.as_deref())?;
    let user = services::user::rename_user(&pool, claims.user_id, name).await?;
    let is_premium = resolver
        .resolve_current_premium(claims.user_id, Utc::now())
        .await?;
    Success::ok(UserView::new(user, is_premium))
}

/// Deletes the account together with its subscriptions and extraction history.
#[delete("/me")]
pub async fn delete_me(
    claims: web::ReqData<JwtClaims>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    services::user::delete_user(&pool, claims.user_id).await?;
    Success::ok(MessageResponse::new("Account deleted successfully"))
}
