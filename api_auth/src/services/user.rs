use api_billing::EntitlementResolver;
use chrono::{DateTime, Utc};
use common::{
    env_config::JwtConfig,
    error::{AppError, Res},
    jwt::{self, ClaimsSpec},
};
use db::{dtos::user::GoogleProfile, models::user::User};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    dtos::auth::{AuthResponse, UserView},
    services::identity::{IdentityVerifier, VerifiedIdentity},
};

pub fn profile_from_identity(identity: &VerifiedIdentity) -> GoogleProfile {
    GoogleProfile {
        google_id: identity.external_id.clone(),
        email: identity.email.clone(),
        name: identity.display_name(),
        picture_url: identity.picture_url.clone(),
    }
}

/// Trimmed, non-empty display name.
pub fn validate_name(name: Option<&str>) -> Res<&str> {
    name.map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::BadRequest("Name is required".to_string()))
}

/// Verifies the credential, upserts the account, reconciles its entitlement and
/// issues a session token.
pub async fn sign_in(
    pool: &PgPool,
    verifier: &dyn IdentityVerifier,
    resolver: &EntitlementResolver,
    jwt_config: &JwtConfig,
    credential: &str,
    now: DateTime<Utc>,
) -> Res<AuthResponse> {
    if credential.trim().is_empty() {
        return Err(AppError::BadRequest("Credential is required".to_string()));
    }

    let identity = verifier.verify(credential.trim()).await?;
    let user = db::user::upsert_google_user(pool, profile_from_identity(&identity))
        .await
        .map_err(|error| {
            if error.is_unique_violation() {
                AppError::BadRequest("Email is already linked to another account".to_string())
            } else {
                error
            }
        })?;

    let is_premium = resolver.reconcile(user.id, now).await?;
    let token = jwt::generate_jwt(
        ClaimsSpec {
            user_id: user.id,
            email: user.email.clone(),
            is_premium,
        },
        jwt_config,
    )?;

    log::info!("User {} signed in", user.id);
    Ok(AuthResponse {
        token,
        user: UserView::new(user, is_premium),
    })
}

/// Fresh user view after reconciling the cached premium flag.
pub async fn verified_user(
    pool: &PgPool,
    resolver: &EntitlementResolver,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Res<UserView> {
    let is_premium = resolver.reconcile(user_id, now).await?;
    let user = db::user::get_user_by_id(pool, user_id).await?;
    Ok(UserView::new(user, is_premium))
}

pub async fn get_user_by_id(pool: &PgPool, user_id: Uuid) -> Res<User> {
    db::user::get_user_by_id(pool, user_id).await
}

pub async fn rename_user(pool: &PgPool, user_id: Uuid, name: &str) -> Res<User> {
    db::user::update_user_name(pool, user_id, name).await
}

/// Removes the account. Subscriptions and history go with it.
pub async fn delete_user(pool: &PgPool, user_id: Uuid) -> Res<()> {
    db::user::delete_user(pool, user_id).await?;
    log::warn!("User {} deleted their account", user_id);
    Ok(())
}
