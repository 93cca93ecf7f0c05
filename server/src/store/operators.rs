use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::AllocationError;
use crate::models::{Operator, OperatorPresence, OperatorRole, OperatorStatus};

/// Create an operator together with its status row (default OFFLINE).
pub async fn create(
    pool: &PgPool,
    tenant_id: Uuid,
    display_name: &str,
    role: OperatorRole,
) -> Result<Operator, AllocationError> {
    let mut tx = pool.begin().await?;
    let operator = sqlx::query_as::<_, Operator>(
        "INSERT INTO operators (id, tenant_id, display_name, role) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, tenant_id, display_name, role, created_at",
    )
    .bind(Uuid::now_v7())
    .bind(tenant_id)
    .bind(display_name)
    .bind(role)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO operator_status (operator_id) VALUES ($1)")
        .bind(operator.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(operator)
}

pub async fn get<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Operator, AllocationError> {
    sqlx::query_as::<_, Operator>(
        "SELECT id, tenant_id, display_name, role, created_at \
         FROM operators WHERE id = $1 AND tenant_id = $2",
    )
    .bind(id)
    .bind(tenant_id)
    .fetch_optional(executor)
    .await?
    .ok_or(AllocationError::NotFound { entity: "operator" })
}

pub async fn get_status(
    pool: &PgPool,
    operator_id: Uuid,
) -> Result<OperatorStatus, AllocationError> {
    sqlx::query_as::<_, OperatorStatus>(
        "SELECT operator_id, status, last_change_at FROM operator_status WHERE operator_id = $1",
    )
    .bind(operator_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AllocationError::NotFound { entity: "operator" })
}

/// Lock and read the status row; presence transitions serialize on it.
pub async fn lock_status(
    tx: &mut Transaction<'_, Postgres>,
    operator_id: Uuid,
) -> Result<OperatorStatus, AllocationError> {
    sqlx::query_as::<_, OperatorStatus>(
        "SELECT operator_id, status, last_change_at \
         FROM operator_status WHERE operator_id = $1 FOR UPDATE",
    )
    .bind(operator_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(AllocationError::NotFound { entity: "operator" })
}

pub async fn update_status(
    tx: &mut Transaction<'_, Postgres>,
    operator_id: Uuid,
    status: OperatorPresence,
) -> Result<OperatorStatus, AllocationError> {
    Ok(sqlx::query_as::<_, OperatorStatus>(
        "UPDATE operator_status SET status = $2, last_change_at = NOW() \
         WHERE operator_id = $1 \
         RETURNING operator_id, status, last_change_at",
    )
    .bind(operator_id)
    .bind(status)
    .fetch_one(&mut **tx)
    .await?)
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Idempotent: re-subscribing an existing pair is a no-op.
pub async fn subscribe(
    pool: &PgPool,
    operator_id: Uuid,
    inbox_id: Uuid,
) -> Result<(), AllocationError> {
    sqlx::query(
        "INSERT INTO subscriptions (operator_id, inbox_id) VALUES ($1, $2) \
         ON CONFLICT (operator_id, inbox_id) DO NOTHING",
    )
    .bind(operator_id)
    .bind(inbox_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn unsubscribe(
    pool: &PgPool,
    operator_id: Uuid,
    inbox_id: Uuid,
) -> Result<(), AllocationError> {
    sqlx::query("DELETE FROM subscriptions WHERE operator_id = $1 AND inbox_id = $2")
        .bind(operator_id)
        .bind(inbox_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// The inbox set visible and allocatable to an operator.
pub async fn subscription_inboxes(
    pool: &PgPool,
    operator_id: Uuid,
) -> Result<Vec<Uuid>, AllocationError> {
    Ok(sqlx::query_scalar(
        "SELECT inbox_id FROM subscriptions WHERE operator_id = $1 ORDER BY inbox_id",
    )
    .bind(operator_id)
    .fetch_all(pool)
    .await?)
}

/// Generic over the executor: allocation and lifecycle check this while
/// already holding a row lock, on the transaction's own connection.
pub async fn is_subscribed<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    operator_id: Uuid,
    inbox_id: Uuid,
) -> Result<bool, AllocationError> {
    Ok(sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM subscriptions WHERE operator_id = $1 AND inbox_id = $2)",
    )
    .bind(operator_id)
    .bind(inbox_id)
    .fetch_one(executor)
    .await?)
}
