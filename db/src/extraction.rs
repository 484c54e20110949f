use common::error::{AppError, Res};
use sqlx::{Executor, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    dtos::extraction::{ExtractionCreateRequest, HistoryFilter},
    models::extraction::{Extraction, ExtractionStats},
};

pub async fn insert_extraction<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: ExtractionCreateRequest,
) -> Res<Extraction> {
    sqlx::query_as::<_, Extraction>(
        r#"
        INSERT INTO extractions
            (user_id, module_type, image_preview, extracted_data, processing_time_ms, success, error_message)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(data.user_id)
    .bind(data.module_type)
    .bind(data.image_preview)
    .bind(data.extracted_data)
    .bind(data.processing_time_ms)
    .bind(data.success)
    .bind(data.error_message)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

fn push_history_conditions(qb: &mut QueryBuilder<'_, Postgres>, filter: &HistoryFilter) {
    qb.push(" WHERE user_id = ").push_bind(filter.user_id);

    if let Some(module_type) = &filter.module_type {
        qb.push(" AND module_type = ").push_bind(module_type.clone());
    }

    if let Some(created_after) = filter.created_after {
        qb.push(" AND created_at >= ").push_bind(created_after);
    }
}

pub async fn list_history<'e, E>(executor: E, filter: &HistoryFilter) -> Res<Vec<Extraction>>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM extractions");
    push_history_conditions(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC");
    qb.push(" LIMIT ").push_bind(filter.limit);
    qb.push(" OFFSET ").push_bind(filter.offset);

    qb.build_query_as::<Extraction>()
        .fetch_all(executor)
        .await
        .map_err(AppError::from)
}

pub async fn count_history<'e, E>(executor: E, filter: &HistoryFilter) -> Res<i64>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM extractions");
    push_history_conditions(&mut qb, filter);

    qb.build_query_scalar::<i64>()
        .fetch_one(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_extraction<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    extraction_id: Uuid,
) -> Res<Extraction> {
    sqlx::query_as::<_, Extraction>("SELECT * FROM extractions WHERE id = $1 AND user_id = $2")
        .bind(extraction_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Extraction not found".to_string()))
}

pub async fn delete_extraction<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    extraction_id: Uuid,
) -> Res<()> {
    let result = sqlx::query("DELETE FROM extractions WHERE id = $1 AND user_id = $2")
        .bind(extraction_id)
        .bind(user_id)
        .execute(executor)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Extraction not found".to_string()));
    }
    Ok(())
}

/// Returns how many rows were removed.
pub async fn delete_all_extractions<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<u64> {
    let result = sqlx::query("DELETE FROM extractions WHERE user_id = $1")
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count_for_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM extractions WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_stats<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<ExtractionStats> {
    sqlx::query_as::<_, ExtractionStats>(
        r#"
        SELECT
            COUNT(*) AS total_extractions,
            COUNT(*) FILTER (WHERE success) AS successful_extractions,
            COUNT(*) FILTER (WHERE NOT success) AS failed_extractions,
            CAST(AVG(processing_time_ms) FILTER (WHERE success) AS FLOAT8) AS avg_processing_time,
            MIN(created_at) AS first_extraction,
            MAX(created_at) AS last_extraction
        FROM extractions
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}
