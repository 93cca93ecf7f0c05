//! Idempotency record store. The unique `(tenant_id, client_key)` index is
//! what collapses concurrent first executions of the same key.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AllocationError;
use crate::models::IdempotencyRecord;

const ALL_COLUMNS: &str = "id, tenant_id, client_key, endpoint, method, request_hash, \
     response_status, response_body, created_at, expires_at";

pub async fn find(
    pool: &PgPool,
    tenant_id: Uuid,
    client_key: &str,
) -> Result<Option<IdempotencyRecord>, AllocationError> {
    let query =
        format!("SELECT {ALL_COLUMNS} FROM idempotency_records WHERE tenant_id = $1 AND client_key = $2");
    Ok(sqlx::query_as::<_, IdempotencyRecord>(&query)
        .bind(tenant_id)
        .bind(client_key)
        .fetch_optional(pool)
        .await?)
}

pub struct NewRecord<'a> {
    pub tenant_id: Uuid,
    pub client_key: &'a str,
    pub endpoint: &'a str,
    pub method: &'a str,
    pub request_hash: &'a str,
    pub response_status: i32,
    pub response_body: &'a str,
    pub expires_at: DateTime<Utc>,
}

/// Returns false when another replica won the insert race; the caller then
/// reads back the winner's record and replays it.
pub async fn insert(pool: &PgPool, record: NewRecord<'_>) -> Result<bool, AllocationError> {
    let result = sqlx::query(
        "INSERT INTO idempotency_records \
           (id, tenant_id, client_key, endpoint, method, request_hash, \
            response_status, response_body, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (tenant_id, client_key) DO NOTHING",
    )
    .bind(Uuid::now_v7())
    .bind(record.tenant_id)
    .bind(record.client_key)
    .bind(record.endpoint)
    .bind(record.method)
    .bind(record.request_hash)
    .bind(record.response_status)
    .bind(record.response_body)
    .bind(record.expires_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(
    pool: &PgPool,
    tenant_id: Uuid,
    client_key: &str,
) -> Result<(), AllocationError> {
    sqlx::query("DELETE FROM idempotency_records WHERE tenant_id = $1 AND client_key = $2")
        .bind(tenant_id)
        .bind(client_key)
        .execute(pool)
        .await?;
    Ok(())
}

/// Bounded delete of expired records; the reaper calls this until it returns
/// less than the batch size.
pub async fn delete_expired(pool: &PgPool, batch_size: i64) -> Result<u64, AllocationError> {
    let result = sqlx::query(
        "DELETE FROM idempotency_records WHERE id IN ( \
           SELECT id FROM idempotency_records WHERE expires_at < NOW() LIMIT $1 \
         )",
    )
    .bind(batch_size)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
