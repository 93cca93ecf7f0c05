//! Allocation coordinator: hands one queued conversation to one operator,
//! no matter how many operators ask at once.
//!
//! Both paths run inside a single transaction and rely on the store's lock
//! primitives: the auto-allocator picks with SKIP LOCKED (concurrent
//! allocators never see each other's rows), the manual claim locks with
//! NOWAIT (a losing claimer fails fast with a retryable error).

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AllocationError;
use crate::identity::CallerIdentity;
use crate::models::{Conversation, ConversationState, OperatorPresence};
use crate::store;

/// Auto-allocate the highest-priority queued conversation from the caller's
/// subscribed inboxes.
#[tracing::instrument(skip(pool, caller), fields(operator_id = %caller.operator_id))]
pub async fn allocate(
    pool: &PgPool,
    caller: &CallerIdentity,
) -> Result<Conversation, AllocationError> {
    let status = store::operators::get_status(pool, caller.operator_id).await?;
    if status.status != OperatorPresence::Available {
        return Err(AllocationError::OperatorNotAvailable);
    }

    let inboxes = store::operators::subscription_inboxes(pool, caller.operator_id).await?;
    if inboxes.is_empty() {
        return Err(AllocationError::NoSubscriptions);
    }

    let mut tx = pool.begin().await?;
    let mut picked =
        store::conversations::pick_next_for_allocation(&mut tx, caller.tenant_id, &inboxes, 1)
            .await?;
    let Some(mut conv) = picked.pop() else {
        return Err(AllocationError::NoConversationsAvailable);
    };

    // The pick query filters on QUEUED and holds the lock; anything else
    // here is a store bug.
    if conv.state != ConversationState::Queued {
        return Err(AllocationError::Internal(format!(
            "picked conversation {} in state {}",
            conv.id, conv.state
        )));
    }

    conv.state = ConversationState::Allocated;
    conv.assigned_operator_id = Some(caller.operator_id);
    conv.updated_at = Utc::now();
    let conv = store::conversations::update(&mut tx, &conv).await?;
    tx.commit().await?;

    metrics::counter!("allocations_total", 1);
    tracing::info!(conversation_id = %conv.id, "Conversation allocated");
    Ok(conv)
}

/// Claim one specific queued conversation.
#[tracing::instrument(skip(pool, caller), fields(operator_id = %caller.operator_id))]
pub async fn claim(
    pool: &PgPool,
    caller: &CallerIdentity,
    conversation_id: Uuid,
) -> Result<Conversation, AllocationError> {
    let status = store::operators::get_status(pool, caller.operator_id).await?;
    if status.status != OperatorPresence::Available {
        return Err(AllocationError::OperatorNotAvailable);
    }

    let mut tx = pool.begin().await?;
    let mut conv = match store::conversations::lock_one_for_claim(&mut tx, conversation_id).await {
        Ok(conv) => conv,
        // Losing the lock race is retryable and gets its own code.
        Err(AllocationError::ConversationLocked) => {
            return Err(AllocationError::ConversationAlreadyClaimed)
        }
        Err(e) => return Err(e),
    };

    if conv.tenant_id != caller.tenant_id {
        return Err(AllocationError::NotFound {
            entity: "conversation",
        });
    }

    if conv.state != ConversationState::Queued {
        // Re-claiming a conversation you already hold is a no-op.
        if conv.state == ConversationState::Allocated
            && conv.assigned_operator_id == Some(caller.operator_id)
        {
            return Ok(conv);
        }
        return Err(AllocationError::ConversationNotQueued { state: conv.state });
    }

    if !store::operators::is_subscribed(&mut *tx, caller.operator_id, conv.inbox_id).await? {
        return Err(AllocationError::NotSubscribedToInbox {
            inbox_id: conv.inbox_id,
        });
    }

    conv.state = ConversationState::Allocated;
    conv.assigned_operator_id = Some(caller.operator_id);
    conv.updated_at = Utc::now();
    let conv = store::conversations::update(&mut tx, &conv).await?;
    tx.commit().await?;

    metrics::counter!("claims_total", 1);
    tracing::info!(conversation_id = %conv.id, "Conversation claimed");
    Ok(conv)
}
