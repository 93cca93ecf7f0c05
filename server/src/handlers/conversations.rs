//! Conversation intake endpoints used by the upstream ingester: insert a
//! freshly persisted conversation into the queue, and the message-received
//! hook that keeps `message_count` / `last_message_at` / the stored score
//! current.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::envelope;
use crate::error::AllocationError;
use crate::identity::TenantContext;
use crate::priority;
use crate::state::AppState;
use crate::store;

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub inbox_id: Uuid,
    pub external_id: String,
    pub customer_phone: String,
    pub last_message_at: Option<DateTime<Utc>>,
    pub message_count: Option<i32>,
}

/// POST /api/v1/conversations
pub async fn create_conversation(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(body): Json<CreateConversationRequest>,
) -> Result<Response, AllocationError> {
    // The inbox must belong to the caller's tenant.
    store::inboxes::get(&state.pool, ctx.tenant_id, body.inbox_id).await?;
    let tenant = store::tenants::get(&state.pool, ctx.tenant_id).await?;

    let last_message_at = body.last_message_at.unwrap_or_else(Utc::now);
    let message_count = body.message_count.unwrap_or(1).max(0);
    let new = store::conversations::NewConversation {
        tenant_id: ctx.tenant_id,
        inbox_id: body.inbox_id,
        external_id: body.external_id,
        customer_phone: body.customer_phone,
        last_message_at,
        message_count,
        priority_score: priority::score_for(&tenant, message_count, last_message_at),
    };

    let conv = store::conversations::create(&state.pool, new).await?;
    Ok(envelope::created(conv))
}

/// GET /api/v1/conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<Response, AllocationError> {
    let conv = store::conversations::get(&state.pool, ctx.tenant_id, id).await?;
    Ok(envelope::ok(conv))
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageReceivedRequest {
    pub received_at: Option<DateTime<Utc>>,
}

/// POST /api/v1/conversations/{id}/message-received
///
/// Ingestion itself lives upstream; this hook is the only path that bumps
/// message bookkeeping, and it re-scores the row while it is at it.
pub async fn message_received(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    body: Option<Json<MessageReceivedRequest>>,
) -> Result<Response, AllocationError> {
    let received_at = body
        .and_then(|Json(b)| b.received_at)
        .unwrap_or_else(Utc::now);

    let current = store::conversations::get(&state.pool, ctx.tenant_id, id).await?;
    let tenant = store::tenants::get(&state.pool, ctx.tenant_id).await?;

    let new_score = priority::score_for(
        &tenant,
        current.message_count.saturating_add(1),
        current.last_message_at.max(received_at),
    );
    let conv =
        store::conversations::record_message(&state.pool, ctx.tenant_id, id, received_at, new_score)
            .await?;
    Ok(envelope::ok(conv))
}
