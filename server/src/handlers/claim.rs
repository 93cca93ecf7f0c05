use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::allocation;
use crate::envelope;
use crate::error::AllocationError;
use crate::identity::CallerIdentity;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub conversation_id: Uuid,
}

/// POST /api/v1/claim
pub async fn claim(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<ClaimRequest>,
) -> Result<Response, AllocationError> {
    let conv = allocation::claim(&state.pool, &caller, body.conversation_id).await?;
    Ok(envelope::ok(conv))
}
