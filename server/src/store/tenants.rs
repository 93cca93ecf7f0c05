use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AllocationError;
use crate::models::Tenant;

pub async fn create(
    pool: &PgPool,
    name: &str,
    alpha: Decimal,
    beta: Decimal,
) -> Result<Tenant, AllocationError> {
    Ok(sqlx::query_as::<_, Tenant>(
        "INSERT INTO tenants (id, name, alpha, beta) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, name, alpha, beta, created_at, updated_at",
    )
    .bind(Uuid::now_v7())
    .bind(name)
    .bind(alpha)
    .bind(beta)
    .fetch_one(pool)
    .await?)
}

/// Generic over the executor so callers inside an open transaction reuse
/// its connection instead of tying up a second one from the pool.
pub async fn get<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    id: Uuid,
) -> Result<Tenant, AllocationError> {
    sqlx::query_as::<_, Tenant>(
        "SELECT id, name, alpha, beta, created_at, updated_at FROM tenants WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or(AllocationError::NotFound { entity: "tenant" })
}

pub async fn update_weights(
    pool: &PgPool,
    id: Uuid,
    alpha: Decimal,
    beta: Decimal,
) -> Result<Tenant, AllocationError> {
    sqlx::query_as::<_, Tenant>(
        "UPDATE tenants SET alpha = $2, beta = $3, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING id, name, alpha, beta, created_at, updated_at",
    )
    .bind(id)
    .bind(alpha)
    .bind(beta)
    .fetch_optional(pool)
    .await?
    .ok_or(AllocationError::NotFound { entity: "tenant" })
}
