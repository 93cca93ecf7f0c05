use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use crate::envelope;
use crate::error::AllocationError;
use crate::identity::{CallerIdentity, TenantContext};
use crate::state::AppState;
use crate::store;

#[derive(Debug, Deserialize)]
pub struct CreateInboxRequest {
    pub phone_number: String,
    pub display_name: String,
}

/// POST /api/v1/inboxes
pub async fn create_inbox(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<CreateInboxRequest>,
) -> Result<Response, AllocationError> {
    caller.require_supervisor()?;
    let inbox = store::inboxes::create(
        &state.pool,
        caller.tenant_id,
        &body.phone_number,
        &body.display_name,
    )
    .await?;
    Ok(envelope::created(inbox))
}

/// GET /api/v1/inboxes
pub async fn list_inboxes(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> Result<Response, AllocationError> {
    let inboxes = store::inboxes::list(&state.pool, ctx.tenant_id).await?;
    Ok(envelope::ok(inboxes))
}
