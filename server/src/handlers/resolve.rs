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
pub struct ResolveRequest {
    pub conversation_id: Uuid,
}

/// POST /api/v1/resolve
pub async fn resolve(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<ResolveRequest>,
) -> Result<Response, AllocationError> {
    let conv = lifecycle::resolve(&state.pool, &caller, body.conversation_id).await?;
    Ok(envelope::ok(conv))
}
