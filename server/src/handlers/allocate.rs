use axum::extract::State;
use axum::response::Response;

use crate::allocation;
use crate::envelope;
use crate::error::AllocationError;
use crate::identity::CallerIdentity;
use crate::state::AppState;

/// POST /api/v1/allocate
///
/// Hand the caller the highest-priority queued conversation from their
/// subscribed inboxes.
pub async fn allocate(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Response, AllocationError> {
    let conv = allocation::allocate(&state.pool, &caller).await?;
    Ok(envelope::ok(conv))
}
