use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{dtos::subscription::SubscriptionCreateRequest, models::subscription::Subscription};

pub async fn find_by_purchase_token<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    purchase_token: &str,
) -> Res<Option<Subscription>> {
    sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE purchase_token = $1")
        .bind(purchase_token)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn insert_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: SubscriptionCreateRequest,
) -> Res<Subscription> {
    sqlx::query_as::<_, Subscription>(
        r#"
        INSERT INTO subscriptions
            (user_id, product_id, purchase_token, order_id, status, start_date, end_date, auto_renewing)
        VALUES ($1, $2, $3, $4, 'active', $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(data.user_id)
    .bind(data.product_id)
    .bind(data.purchase_token)
    .bind(data.order_id)
    .bind(data.start_date)
    .bind(data.end_date)
    .bind(data.auto_renewing)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_latest_active<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Option<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        r#"
        SELECT * FROM subscriptions
        WHERE user_id = $1 AND status = 'active'
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Moves every subscription of the user whose end date has passed to `expired`
/// and returns the rows that changed.
pub async fn expire_lapsed<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Res<Vec<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        r#"
        UPDATE subscriptions
        SET status = 'expired'
        WHERE user_id = $1
          AND status IN ('active', 'cancelled')
          AND end_date IS NOT NULL
          AND end_date <= $2
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(now)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn cancel_active<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Vec<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        r#"
        UPDATE subscriptions
        SET status = 'cancelled', auto_renewing = FALSE
        WHERE user_id = $1 AND status = 'active'
        RETURNING *
        "#,
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn list_for_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Vec<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        "SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}
