use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::envelope;
use crate::error::AllocationError;
use crate::identity::CallerIdentity;
use crate::lifecycle;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MoveInboxRequest {
    pub conversation_id: Uuid,
    pub inbox_id: Uuid,
}

/// POST /api/v1/move_inbox
pub async fn move_inbox(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<MoveInboxRequest>,
) -> Result<Response, AllocationError> {
    let conv =
        lifecycle::move_inbox(&state.pool, &caller, body.conversation_id, body.inbox_id).await?;
    Ok(envelope::ok(conv))
}
