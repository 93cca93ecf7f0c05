use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use crate::envelope;
use crate::error::AllocationError;
use crate::identity::CallerIdentity;
use crate::models::OperatorPresence;
use crate::presence;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: OperatorPresence,
}

/// PUT /api/v1/operator/status
///
/// Idempotent: re-declaring the current status is a no-op.
pub async fn set_operator_status(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<SetStatusRequest>,
) -> Result<Response, AllocationError> {
    let status = presence::set_status(
        &state.pool,
        &caller,
        body.status,
        state.config.grace_period,
    )
    .await?;
    Ok(envelope::ok(status))
}
