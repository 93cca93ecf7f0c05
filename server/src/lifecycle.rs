//! Lifecycle controller: role-gated state-machine transitions.
//!
//! Every operation re-reads the conversation under `FOR UPDATE` inside one
//! transaction and reports an already-final intent as success rather than a
//! conflict. Tenant mismatches read as NOT_FOUND. Grace tickets are
//! cancelled whenever a conversation leaves ALLOCATED or changes owner.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AllocationError;
use crate::identity::CallerIdentity;
use crate::models::{Conversation, ConversationState};
use crate::priority;
use crate::store;

/// ALLOCATED → RESOLVED. Allowed for the owning operator or a supervisor.
#[tracing::instrument(skip(pool, caller), fields(operator_id = %caller.operator_id))]
pub async fn resolve(
    pool: &PgPool,
    caller: &CallerIdentity,
    conversation_id: Uuid,
) -> Result<Conversation, AllocationError> {
    let mut tx = pool.begin().await?;
    let mut conv =
        store::conversations::lock_for_update(&mut tx, caller.tenant_id, conversation_id).await?;

    if conv.state == ConversationState::Resolved {
        return Ok(conv);
    }
    if conv.state != ConversationState::Allocated {
        return Err(AllocationError::ConversationNotAllocated { state: conv.state });
    }

    let is_owner = conv.assigned_operator_id == Some(caller.operator_id);
    if !is_owner && !caller.role.is_supervisor() {
        return Err(AllocationError::InsufficientPermissions {
            required: "MANAGER",
        });
    }

    let now = Utc::now();
    conv.state = ConversationState::Resolved;
    conv.resolved_at = Some(now);
    conv.updated_at = now;
    store::grace_tickets::delete_for_conversation(&mut tx, conv.id).await?;
    let conv = store::conversations::update(&mut tx, &conv).await?;
    tx.commit().await?;

    metrics::counter!("resolutions_total", 1);
    tracing::info!(conversation_id = %conv.id, "Conversation resolved");
    Ok(conv)
}

/// ALLOCATED → QUEUED. Supervisor only; the role gate fires before any read.
#[tracing::instrument(skip(pool, caller), fields(operator_id = %caller.operator_id))]
pub async fn deallocate(
    pool: &PgPool,
    caller: &CallerIdentity,
    conversation_id: Uuid,
) -> Result<Conversation, AllocationError> {
    caller.require_supervisor()?;

    let tenant = store::tenants::get(pool, caller.tenant_id).await?;
    let mut tx = pool.begin().await?;
    let mut conv =
        store::conversations::lock_for_update(&mut tx, caller.tenant_id, conversation_id).await?;

    if conv.state == ConversationState::Queued {
        return Ok(conv);
    }
    if conv.state != ConversationState::Allocated {
        return Err(AllocationError::ConversationNotAllocated { state: conv.state });
    }

    conv.state = ConversationState::Queued;
    conv.assigned_operator_id = None;
    conv.priority_score = priority::score_for(&tenant, conv.message_count, conv.last_message_at);
    conv.updated_at = Utc::now();
    store::grace_tickets::delete_for_conversation(&mut tx, conv.id).await?;
    let conv = store::conversations::update(&mut tx, &conv).await?;
    tx.commit().await?;

    tracing::info!(conversation_id = %conv.id, "Conversation returned to queue");
    Ok(conv)
}

/// Hand an ALLOCATED conversation to a different operator. Supervisor only.
#[tracing::instrument(skip(pool, caller), fields(operator_id = %caller.operator_id))]
pub async fn reassign(
    pool: &PgPool,
    caller: &CallerIdentity,
    conversation_id: Uuid,
    new_operator_id: Uuid,
) -> Result<Conversation, AllocationError> {
    caller.require_supervisor()?;

    let mut tx = pool.begin().await?;
    let mut conv =
        store::conversations::lock_for_update(&mut tx, caller.tenant_id, conversation_id).await?;

    if conv.state != ConversationState::Allocated {
        return Err(AllocationError::ConversationNotAllocated { state: conv.state });
    }

    store::operators::get(&mut *tx, caller.tenant_id, new_operator_id)
        .await
        .map_err(|e| match e {
            AllocationError::NotFound { .. } => AllocationError::OperatorNotFound {
                operator_id: new_operator_id,
            },
            other => other,
        })?;

    if !store::operators::is_subscribed(&mut *tx, new_operator_id, conv.inbox_id).await? {
        return Err(AllocationError::OperatorNotSubscribed {
            operator_id: new_operator_id,
            inbox_id: conv.inbox_id,
        });
    }

    if conv.assigned_operator_id == Some(new_operator_id) {
        return Ok(conv);
    }

    // The previous owner's pending reclaim no longer applies.
    store::grace_tickets::delete_for_conversation(&mut tx, conv.id).await?;
    conv.assigned_operator_id = Some(new_operator_id);
    conv.updated_at = Utc::now();
    let conv = store::conversations::update(&mut tx, &conv).await?;
    tx.commit().await?;

    tracing::info!(
        conversation_id = %conv.id,
        new_operator_id = %new_operator_id,
        "Conversation reassigned"
    );
    Ok(conv)
}

/// Move a conversation to another inbox of the same tenant. Supervisor only.
/// If the current owner is not subscribed to the target inbox the
/// conversation is auto-deallocated back to the queue.
#[tracing::instrument(skip(pool, caller), fields(operator_id = %caller.operator_id))]
pub async fn move_inbox(
    pool: &PgPool,
    caller: &CallerIdentity,
    conversation_id: Uuid,
    new_inbox_id: Uuid,
) -> Result<Conversation, AllocationError> {
    caller.require_supervisor()?;

    match store::inboxes::tenant_of(pool, new_inbox_id).await? {
        None => {
            return Err(AllocationError::InboxNotFound {
                inbox_id: new_inbox_id,
            })
        }
        Some(owner) if owner != caller.tenant_id => {
            return Err(AllocationError::InboxDifferentTenant)
        }
        Some(_) => {}
    }

    let tenant = store::tenants::get(pool, caller.tenant_id).await?;
    let mut tx = pool.begin().await?;
    let mut conv =
        store::conversations::lock_for_update(&mut tx, caller.tenant_id, conversation_id).await?;

    if conv.inbox_id == new_inbox_id {
        return Ok(conv);
    }

    conv.inbox_id = new_inbox_id;
    conv.updated_at = Utc::now();

    // Labels are scoped to an inbox; attachments cannot follow the move.
    sqlx::query("DELETE FROM conversation_labels WHERE conversation_id = $1")
        .bind(conv.id)
        .execute(&mut *tx)
        .await?;

    if conv.state == ConversationState::Allocated {
        let owner = conv
            .assigned_operator_id
            .ok_or_else(|| AllocationError::Internal("allocated conversation without owner".into()))?;
        if !store::operators::is_subscribed(&mut *tx, owner, new_inbox_id).await? {
            conv.state = ConversationState::Queued;
            conv.assigned_operator_id = None;
            conv.priority_score =
                priority::score_for(&tenant, conv.message_count, conv.last_message_at);
            store::grace_tickets::delete_for_conversation(&mut tx, conv.id).await?;
        }
    }

    let conv = store::conversations::update(&mut tx, &conv).await?;
    tx.commit().await?;

    tracing::info!(
        conversation_id = %conv.id,
        inbox_id = %new_inbox_id,
        state = %conv.state,
        "Conversation moved"
    );
    Ok(conv)
}
