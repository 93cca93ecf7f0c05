//! Label CRUD (MANAGER/ADMIN) and conversation tagging (any role).

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::envelope;
use crate::error::AllocationError;
use crate::identity::{CallerIdentity, TenantContext};
use crate::state::AppState;
use crate::store;

#[derive(Debug, Deserialize)]
pub struct CreateLabelRequest {
    pub inbox_id: Uuid,
    pub name: String,
    pub color: Option<String>,
}

/// POST /api/v1/labels
pub async fn create_label(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<CreateLabelRequest>,
) -> Result<Response, AllocationError> {
    caller.require_supervisor()?;
    store::inboxes::get(&state.pool, caller.tenant_id, body.inbox_id).await?;
    let label = store::labels::create(
        &state.pool,
        caller.tenant_id,
        body.inbox_id,
        &body.name,
        body.color.as_deref(),
    )
    .await?;
    Ok(envelope::created(label))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListLabelsQuery {
    pub inbox_id: Option<Uuid>,
}

/// GET /api/v1/labels
pub async fn list_labels(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<ListLabelsQuery>,
) -> Result<Response, AllocationError> {
    let labels = store::labels::list(&state.pool, ctx.tenant_id, query.inbox_id).await?;
    Ok(envelope::ok(labels))
}

/// DELETE /api/v1/labels/{id}
pub async fn delete_label(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Response, AllocationError> {
    caller.require_supervisor()?;
    store::labels::delete(&state.pool, caller.tenant_id, id).await?;
    Ok(envelope::ok(json!({ "deleted": true })))
}

/// POST /api/v1/conversations/{id}/labels/{label_id}
pub async fn attach_label(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((conversation_id, label_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AllocationError> {
    store::labels::attach(&state.pool, caller.tenant_id, conversation_id, label_id).await?;
    Ok(envelope::ok(json!({ "attached": true })))
}

/// DELETE /api/v1/conversations/{id}/labels/{label_id}
pub async fn detach_label(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((conversation_id, label_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AllocationError> {
    store::labels::detach(&state.pool, caller.tenant_id, conversation_id, label_id).await?;
    Ok(envelope::ok(json!({ "detached": true })))
}
