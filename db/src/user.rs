use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    dtos::user::GoogleProfile,
    models::user::{PremiumState, UsageCounter, User},
};

/// Statuses that still grant access when the end date is in the future.
pub(crate) const ACCESS_GRANTING_SQL: &str = "s.status IN ('active', 'cancelled') AND (s.end_date IS NULL OR s.end_date > $2)";

pub async fn get_user_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Creates the user on first sign-in, refreshing email, name and picture afterwards.
pub async fn upsert_google_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    profile: GoogleProfile,
) -> Res<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (google_id, email, name, picture_url)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (google_id) DO UPDATE
        SET email = EXCLUDED.email,
            name = EXCLUDED.name,
            picture_url = EXCLUDED.picture_url
        RETURNING *
        "#,
    )
    .bind(profile.google_id)
    .bind(profile.email)
    .bind(profile.name)
    .bind(profile.picture_url)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn update_user_name<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    name: &str,
) -> Res<User> {
    sqlx::query_as::<_, User>("UPDATE users SET name = $2 WHERE id = $1 RETURNING *")
        .bind(user_id)
        .bind(name)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Deletes the account. Subscriptions and extractions go with it.
pub async fn delete_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<()> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(executor)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    Ok(())
}

pub async fn get_usage_counter<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Option<UsageCounter>> {
    sqlx::query_as::<_, UsageCounter>(
        "SELECT daily_extractions_count, last_extraction_reset FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Opens a fresh window, but only if nobody else reset it since `expected_start` was read.
/// Returns whether this call performed the reset.
pub async fn reset_usage_window<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    expected_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Res<bool> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET daily_extractions_count = 0, last_extraction_reset = $3
        WHERE id = $1 AND last_extraction_reset = $2
        "#,
    )
    .bind(user_id)
    .bind(expected_start)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn increment_usage<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<bool> {
    let result = sqlx::query(
        "UPDATE users SET daily_extractions_count = daily_extractions_count + 1 WHERE id = $1",
    )
    .bind(user_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Cached flag together with whether an active, unexpired subscription exists.
pub async fn get_premium_state<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Res<Option<PremiumState>> {
    sqlx::query_as::<_, PremiumState>(
        r#"
        SELECT u.is_premium,
               EXISTS (
                   SELECT 1 FROM subscriptions s
                   WHERE s.user_id = u.id
                     AND s.status = 'active'
                     AND (s.end_date IS NULL OR s.end_date > $2)
               ) AS has_live_subscription
        FROM users u
        WHERE u.id = $1
        "#,
    )
    .bind(user_id)
    .bind(now)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Takes the row lock on the user. Premium writes and expiry sweeps of the same
/// user serialize on it. Returns false when the user does not exist.
pub async fn lock_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<bool> {
    let locked = sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(executor)
        .await?;
    Ok(locked.is_some())
}

/// Sets the cached flag only while an active, unexpired subscription still
/// exists at `now`. Returns false when nothing was written.
pub async fn grant_premium_if_live<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Res<bool> {
    let result = sqlx::query(
        r#"
        UPDATE users u
        SET is_premium = TRUE
        WHERE u.id = $1
          AND u.is_premium = FALSE
          AND EXISTS (
              SELECT 1 FROM subscriptions s
              WHERE s.user_id = u.id
                AND s.status = 'active'
                AND (s.end_date IS NULL OR s.end_date > $2)
          )
        "#,
    )
    .bind(user_id)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn grant_premium<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    expires_at: Option<DateTime<Utc>>,
) -> Res<()> {
    sqlx::query("UPDATE users SET is_premium = TRUE, premium_expires_at = $2 WHERE id = $1")
        .bind(user_id)
        .bind(expires_at)
        .execute(executor)
        .await?;
    Ok(())
}

/// Recomputes the cached flag after subscriptions expired: premium survives only
/// while another subscription still grants access.
pub async fn refresh_premium_after_expiry<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Res<()> {
    let query = format!(
        r#"
        WITH access AS (
            SELECT EXISTS (
                SELECT 1 FROM subscriptions s WHERE s.user_id = $1 AND {ACCESS_GRANTING_SQL}
            ) AS still_entitled
        )
        UPDATE users
        SET is_premium = access.still_entitled,
            premium_expires_at = CASE WHEN access.still_entitled THEN premium_expires_at ELSE NULL END
        FROM access
        WHERE id = $1
        "#
    );
    sqlx::query(&query)
        .bind(user_id)
        .bind(now)
        .execute(executor)
        .await?;
    Ok(())
}
