use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AllocationError;
use crate::models::Inbox;

pub async fn create(
    pool: &PgPool,
    tenant_id: Uuid,
    phone_number: &str,
    display_name: &str,
) -> Result<Inbox, AllocationError> {
    sqlx::query_as::<_, Inbox>(
        "INSERT INTO inboxes (id, tenant_id, phone_number, display_name) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, tenant_id, phone_number, display_name, created_at",
    )
    .bind(Uuid::now_v7())
    .bind(tenant_id)
    .bind(phone_number)
    .bind(display_name)
    .fetch_one(pool)
    .await
    .map_err(|e| AllocationError::from(e).on_unique("inbox", phone_number.to_string()))
}

pub async fn get(pool: &PgPool, tenant_id: Uuid, id: Uuid) -> Result<Inbox, AllocationError> {
    sqlx::query_as::<_, Inbox>(
        "SELECT id, tenant_id, phone_number, display_name, created_at \
         FROM inboxes WHERE id = $1 AND tenant_id = $2",
    )
    .bind(id)
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AllocationError::NotFound { entity: "inbox" })
}

/// Owning tenant of an inbox, regardless of the caller's tenant. Used to
/// tell "no such inbox" apart from "inbox in another tenant".
pub async fn tenant_of(pool: &PgPool, id: Uuid) -> Result<Option<Uuid>, AllocationError> {
    Ok(sqlx::query_scalar("SELECT tenant_id FROM inboxes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

pub async fn list(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<Inbox>, AllocationError> {
    Ok(sqlx::query_as::<_, Inbox>(
        "SELECT id, tenant_id, phone_number, display_name, created_at \
         FROM inboxes WHERE tenant_id = $1 ORDER BY created_at, id",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?)
}
