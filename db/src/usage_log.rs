use crate::dtos::usage_log::ApiUsageCreateRequest;
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};

pub async fn insert_api_usage<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    entry: ApiUsageCreateRequest,
) -> Res<()> {
    sqlx::query(
        "INSERT INTO api_usage (user_id, endpoint, method, status_code, response_time_ms, ip_address, user_agent)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(entry.user_id)
    .bind(&entry.endpoint)
    .bind(&entry.method)
    .bind(entry.status_code)
    .bind(entry.response_time_ms)
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .execute(executor)
    .await
    .map_err(AppError::from)?;

    Ok(())
}
