//! Grace ticket store. Tickets are the reclaimer's pending-work set;
//! the unique constraint on `conversation_id` makes installation idempotent.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::AllocationError;
use crate::models::{GraceReason, GraceTicket};

/// Install one ticket per conversation for an operator that just went
/// OFFLINE. Conversations that already carry a ticket keep it.
pub async fn install(
    tx: &mut Transaction<'_, Postgres>,
    operator_id: Uuid,
    conversation_ids: &[Uuid],
    expires_at: DateTime<Utc>,
    reason: GraceReason,
) -> Result<u64, AllocationError> {
    if conversation_ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query(
        "INSERT INTO grace_tickets (id, conversation_id, operator_id, expires_at, reason) \
         SELECT gen_random_uuid(), conv_id, $1, $2, $3 FROM UNNEST($4::uuid[]) AS conv_id \
         ON CONFLICT (conversation_id) DO NOTHING",
    )
    .bind(operator_id)
    .bind(expires_at)
    .bind(reason)
    .bind(conversation_ids)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

/// One statement clears every ticket the operator holds (return-to-AVAILABLE).
pub async fn delete_for_operator(
    tx: &mut Transaction<'_, Postgres>,
    operator_id: Uuid,
) -> Result<u64, AllocationError> {
    let result = sqlx::query("DELETE FROM grace_tickets WHERE operator_id = $1")
        .bind(operator_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

/// Cancel the ticket on a conversation that terminated or changed owner.
pub async fn delete_for_conversation(
    tx: &mut Transaction<'_, Postgres>,
    conversation_id: Uuid,
) -> Result<u64, AllocationError> {
    let result = sqlx::query("DELETE FROM grace_tickets WHERE conversation_id = $1")
        .bind(conversation_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

/// Unlocked read of expired ticket ids. Each candidate is then claimed and
/// settled in its own transaction by the reclaimer.
pub async fn expired_candidates(
    pool: &sqlx::PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Uuid>, AllocationError> {
    Ok(sqlx::query_scalar(
        "SELECT id FROM grace_tickets \
         WHERE expires_at <= $1 \
         ORDER BY expires_at ASC \
         LIMIT $2",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?)
}

/// Claim one expired ticket for settlement. Skip-locked so parallel
/// reclaimer replicas partition the work; returns None when a peer already
/// holds or settled the ticket, or when it was cancelled meanwhile.
pub async fn claim_expired(
    tx: &mut Transaction<'_, Postgres>,
    ticket_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<GraceTicket>, AllocationError> {
    Ok(sqlx::query_as::<_, GraceTicket>(
        "SELECT id, conversation_id, operator_id, expires_at, reason, created_at \
         FROM grace_tickets \
         WHERE id = $1 AND expires_at <= $2 \
         FOR UPDATE SKIP LOCKED",
    )
    .bind(ticket_id)
    .bind(now)
    .fetch_optional(&mut **tx)
    .await?)
}

pub async fn delete(
    tx: &mut Transaction<'_, Postgres>,
    ticket_id: Uuid,
) -> Result<(), AllocationError> {
    sqlx::query("DELETE FROM grace_tickets WHERE id = $1")
        .bind(ticket_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
