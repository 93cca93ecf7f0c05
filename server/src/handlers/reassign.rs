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
pub struct ReassignRequest {
    pub conversation_id: Uuid,
    pub operator_id: Uuid,
}

/// POST /api/v1/reassign
pub async fn reassign(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<ReassignRequest>,
) -> Result<Response, AllocationError> {
    let conv =
        lifecycle::reassign(&state.pool, &caller, body.conversation_id, body.operator_id).await?;
    Ok(envelope::ok(conv))
}
