use chrono::{DateTime, Utc};
use db::models::user::User;
use limiter::UsageSummary;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct GoogleSignInRequest {
    /// Firebase or Google ID token obtained by the client.
    #[serde(default, alias = "idToken", alias = "token")]
    pub credential: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
}

/// Public projection of a user with its effective premium status.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub picture_url: Option<String>,
    pub is_premium: bool,
    pub premium_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserView {
    pub fn new(user: User, is_premium: bool) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            picture_url: user.picture_url,
            is_premium,
            premium_expires_at: user.premium_expires_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserView,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user: UserView,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserView,
    pub total_extractions: i64,
    pub usage: UsageSummary,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}
