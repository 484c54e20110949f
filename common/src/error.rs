use actix_web::{HttpResponse, http::header};
use thiserror::Error;

use crate::quota::QuotaDenial;

pub type Res<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    // === CONVERSION ERRORS ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    JWT(#[from] jsonwebtoken::errors::Error),

    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    // === APPLICATION ERRORS ===
    #[error("Authorization error: {0}")]
    Unauthorized(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Too Many Requests: {0}")]
    TooManyRequests(String),

    #[error("{}", .0.message)]
    QuotaExceeded(QuotaDenial),

    /// Carries the subscription that was recorded for the token the first time.
    #[error("This purchase has already been registered")]
    DuplicateToken(serde_json::Value),

    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Table extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// True for unique constraint violations reported by Postgres.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db_error)) => db_error.is_unique_violation(),
            _ => false,
        }
    }

    pub fn to_http_response(&self) -> HttpResponse {
        let is_dev = cfg!(debug_assertions);

        let to_internal_json = |err_msg: &str| {
            if is_dev {
                serde_json::json!({ "error": err_msg })
            } else {
                serde_json::json!({ "error": "Internal server error" })
            }
        };

        match self {
            // === CONVERSION ERRORS ===
            AppError::Database(error) => {
                log::error!("Database error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }
            AppError::JWT(error) => {
                log::error!("JWT error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }
            AppError::Reqwest(error) => {
                log::error!("Reqwest error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }

            // === APPLICATION ERRORS ===
            AppError::Unauthorized(_) | AppError::InvalidCredential(_) => {
                HttpResponse::Unauthorized().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::Forbidden(_) => {
                HttpResponse::Forbidden().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::NotFound(_) => {
                HttpResponse::NotFound().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::BadRequest(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::TooManyRequests(_) => HttpResponse::TooManyRequests()
                .json(serde_json::json!({ "error": self.to_string() })),
            AppError::QuotaExceeded(denial) => {
                let retry_after_secs = (denial.retry_after_hours() * 3600).max(0);
                HttpResponse::TooManyRequests()
                    .insert_header((header::RETRY_AFTER, retry_after_secs.to_string()))
                    .json(serde_json::json!({
                        "error": denial.scope,
                        "message": denial.message,
                        "usage": denial.usage,
                        "retry_after_hours": denial.retry_after_hours(),
                    }))
            }
            AppError::DuplicateToken(subscription) => {
                HttpResponse::Conflict().json(serde_json::json!({
                    "error": self.to_string(),
                    "subscription": subscription,
                }))
            }
            AppError::UpstreamUnavailable(error) => {
                log::error!("Upstream unavailable: {}", error);
                HttpResponse::ServiceUnavailable().json(to_internal_json(&self.to_string()))
            }
            AppError::ExtractionFailed(reason) => {
                log::error!("Extraction failed: {}", reason);
                HttpResponse::BadGateway().json(serde_json::json!({ "error": self.to_string() }))
            }

            AppError::Internal(error) => {
                log::error!("Internal error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        self.to_http_response()
    }
}
