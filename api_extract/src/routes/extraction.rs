use actix_web::{Responder, delete, get, post, web};
use chrono::Utc;
use common::{error::Res, http::Success, jwt::JwtClaims, quota::Allowance};
use db::dtos::extraction::HistoryQuery;
use limiter::QuotaTicket;
use serde_json::json;
use uuid::Uuid;

use crate::{
    dtos::extraction::{
        DeletedResponse, ExtractRequest, ExtractionResponse, GuestExtractionResponse,
    },
    services::extraction::ExtractionService,
};

/// Extracts a table without an account. Limited per client IP.
///
/// # Input
/// - `req`: JSON payload with a base64 `image` (data URLs accepted) and an optional `mime_type`
/// - `ticket`: admission granted by the guest quota gate
///
/// # Output
/// - Success: the table with markdown and CSV renderings, quality metrics and the
///   guest usage after this extraction
/// - Error: 400 for an invalid image, 429 with `retry_after_hours` once the guest
///   limit is reached, 502/503 when the provider fails
///
/// # Frontend Example
/// ```javascript
/// const response = await fetch('/api/extractions/extract-guest', {
///   method: 'POST',
///   headers: { 'Content-Type': 'application/json' },
///   body: JSON.stringify({ image: dataUrl, mime_type: 'image/jpeg' })
/// });
///
/// if (response.status === 429) {
///   const { retry_after_hours } = await response.json();
///   showSignInPrompt(retry_after_hours);
/// } else if (response.ok) {
///   const { extraction, usage } = await response.json();
///   renderTable(extraction.table.headers, extraction.table.rows);
///   console.log(`${usage.remaining} guest extractions left`);
/// }
/// ```
#[post("/extract-guest", wrap = "limiter::guest_quota_middleware()")]
pub async fn post_extract_guest(
    req: web::Json<ExtractRequest>,
    ticket: web::ReqData<QuotaTicket>,
    service: web::Data<ExtractionService>,
) -> Res<impl Responder> {
    let extraction = service.extract_for_guest(&req, Utc::now()).await?;
    let usage = ticket.usage.after_one_more();
    let upgrade_message = match usage.remaining {
        Allowance::Limited(0) => {
            "You have used all guest extractions. Sign in to get more.".to_string()
        }
        Allowance::Limited(remaining) => format!("{} guest extractions left.", remaining),
        Allowance::Unlimited => String::new(),
    };

    Success::ok(GuestExtractionResponse {
        message: "Table extracted successfully (guest mode)".to_string(),
        extraction,
        guest_mode: true,
        usage,
        upgrade_message,
    })
}

/// Extracts a table for the signed-in user and stores it in the history.
///
/// Free accounts are limited per day, premium accounts are not. Only successful
/// extractions count towards the limit.
///
/// # Frontend Example
/// ```javascript
/// const response = await fetch('/api/extractions/extract', {
///   method: 'POST',
///   headers: {
///     'Authorization': `Bearer ${token}`,
///     'Content-Type': 'application/json'
///   },
///   body: JSON.stringify({ image: base64, mime_type: 'image/png' })
/// });
///
/// const body = await response.json();
/// if (response.status === 429) {
///   console.log(`Daily limit reached, resets in ${body.retry_after_hours}h`);
/// }
/// ```
#[post(
    "/extract",
    wrap = "limiter::user_quota_middleware()",
    wrap = "api_auth::auth_middleware()"
)]
pub async fn post_extract(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<ExtractRequest>,
    ticket: web::ReqData<QuotaTicket>,
    service: web::Data<ExtractionService>,
) -> Res<impl Responder> {
    let extraction = service.extract_for_user(claims.user_id, &req).await?;
    Success::ok(ExtractionResponse {
        message: "Table extracted successfully".to_string(),
        extraction,
        usage: ticket.usage.after_one_more(),
    })
}

/// Paginated history, newest first. Free accounts see the last 7 days.
///
/// Query parameters: `limit` (default 50, max 100), `offset`, `module_type`.
#[get("/history")]
pub async fn get_history(
    claims: web::ReqData<JwtClaims>,
    query: web::Query<HistoryQuery>,
    service: web::Data<ExtractionService>,
) -> Res<impl Responder> {
    let page = service
        .history(claims.user_id, query.into_inner(), Utc::now())
        .await?;
    Success::ok(page)
}

#[get("/stats/summary")]
pub async fn get_stats(
    claims: web::ReqData<JwtClaims>,
    service: web::Data<ExtractionService>,
) -> Res<impl Responder> {
    let stats = service.stats(claims.user_id).await?;
    Success::ok(json!({ "stats": stats }))
}

#[get("/{id}")]
pub async fn get_extraction(
    claims: web::ReqData<JwtClaims>,
    path: web::Path<Uuid>,
    service: web::Data<ExtractionService>,
) -> Res<impl Responder> {
    let extraction = service.get(claims.user_id, path.into_inner()).await?;
    Success::ok(json!({ "extraction": extraction }))
}

#[delete("/{id}")]
pub async fn delete_extraction(
    claims: web::ReqData<JwtClaims>,
    path: web::Path<Uuid>,
    service: web::Data<ExtractionService>,
) -> Res<impl Responder> {
    service.delete(claims.user_id, path.into_inner()).await?;
    Success::ok(json!({ "message": "Extraction deleted successfully" }))
}

/// Clears the whole history of the caller.
#[delete("")]
pub async fn delete_all(
    claims: web::ReqData<JwtClaims>,
    service: web::Data<ExtractionService>,
) -> Res<impl Responder> {
    let deleted_count = service.delete_all(claims.user_id).await?;
    Success::ok(DeletedResponse {
        message: "History deleted successfully".to_string(),
        deleted_count,
    })
}
