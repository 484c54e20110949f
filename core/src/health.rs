use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Responder, get, web};
use chrono::Utc;
use common::{
    env_config::Config,
    error::{AppError, Res},
    http::Success,
};
use serde_json::json;
use sqlx::PgPool;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Liveness plus a database round trip. Answers 503 when the database is down.
#[get("/health")]
pub async fn get_health(
    pool: web::Data<Arc<PgPool>>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    db::ping(&pool)
        .await
        .map_err(|e| AppError::UpstreamUnavailable(format!("database: {}", e)))?;

    Success::ok(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "environment": config.environment,
        "database": { "status": "connected" },
        "version": VERSION,
    }))
}

#[get("/")]
pub async fn get_root() -> Res<impl Responder> {
    Success::ok(json!({
        "message": "Image2Sheet API",
        "version": VERSION,
        "endpoints": {
            "health": "/api/health",
            "auth": "/api/auth",
            "users": "/api/users",
            "extractions": "/api/extractions",
            "billing": "/api/billing",
        },
    }))
}

pub async fn not_found(req: HttpRequest) -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "error": "Endpoint not found",
        "path": req.path(),
    }))
}
