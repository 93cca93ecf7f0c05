//! Operator presence and the grace tracker.
//!
//! Going OFFLINE installs one grace ticket per owned ALLOCATED conversation;
//! coming back AVAILABLE clears them. The tickets are a pending-work set for
//! the reclaimer, not authoritative state: losing them only delays
//! reclamation, and the reclaimer re-verifies ownership before moving
//! anything.

use chrono::Utc;
use sqlx::PgPool;
use std::time::Duration;

use crate::error::AllocationError;
use crate::identity::CallerIdentity;
use crate::models::{GraceReason, OperatorPresence, OperatorStatus};
use crate::store;

#[tracing::instrument(skip(pool, caller), fields(operator_id = %caller.operator_id))]
pub async fn set_status(
    pool: &PgPool,
    caller: &CallerIdentity,
    new_status: OperatorPresence,
    grace_period: Duration,
) -> Result<OperatorStatus, AllocationError> {
    let mut tx = pool.begin().await?;
    let current = store::operators::lock_status(&mut tx, caller.operator_id).await?;

    if current.status == new_status {
        return Ok(current);
    }

    let updated = store::operators::update_status(&mut tx, caller.operator_id, new_status).await?;

    match new_status {
        OperatorPresence::Offline => {
            let owned = store::conversations::lock_allocated_to(&mut tx, caller.operator_id).await?;
            let conversation_ids: Vec<_> = owned.iter().map(|c| c.id).collect();
            let expires_at = Utc::now()
                + chrono::Duration::from_std(grace_period)
                    .map_err(|e| AllocationError::Internal(e.to_string()))?;
            let installed = store::grace_tickets::install(
                &mut tx,
                caller.operator_id,
                &conversation_ids,
                expires_at,
                GraceReason::Offline,
            )
            .await?;
            tracing::info!(
                owned = conversation_ids.len(),
                installed,
                "Operator went offline; grace tickets installed"
            );
        }
        OperatorPresence::Available => {
            let cancelled =
                store::grace_tickets::delete_for_operator(&mut tx, caller.operator_id).await?;
            tracing::info!(cancelled, "Operator back online; grace tickets cancelled");
        }
    }

    tx.commit().await?;
    Ok(updated)
}
