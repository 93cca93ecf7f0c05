//! Operator and subscription administration.

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::envelope;
use crate::error::AllocationError;
use crate::identity::CallerIdentity;
use crate::models::OperatorRole;
use crate::state::AppState;
use crate::store;

#[derive(Debug, Deserialize)]
pub struct CreateOperatorRequest {
    pub display_name: String,
    pub role: OperatorRole,
}

/// POST /api/v1/operators — ADMIN only.
pub async fn create_operator(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<CreateOperatorRequest>,
) -> Result<Response, AllocationError> {
    caller.require_admin()?;
    let operator =
        store::operators::create(&state.pool, caller.tenant_id, &body.display_name, body.role)
            .await?;
    Ok(envelope::created(operator))
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub operator_id: Uuid,
    pub inbox_id: Uuid,
}

/// POST /api/v1/subscriptions
pub async fn create_subscription(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<SubscriptionRequest>,
) -> Result<Response, AllocationError> {
    caller.require_supervisor()?;
    // Both ends must exist in the caller's tenant.
    store::operators::get(&state.pool, caller.tenant_id, body.operator_id).await?;
    store::inboxes::get(&state.pool, caller.tenant_id, body.inbox_id).await?;

    store::operators::subscribe(&state.pool, body.operator_id, body.inbox_id).await?;
    Ok(envelope::created(json!({ "subscribed": true })))
}

/// DELETE /api/v1/subscriptions
pub async fn delete_subscription(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<SubscriptionRequest>,
) -> Result<Response, AllocationError> {
    caller.require_supervisor()?;
    store::operators::get(&state.pool, caller.tenant_id, body.operator_id).await?;
    store::operators::unsubscribe(&state.pool, body.operator_id, body.inbox_id).await?;
    Ok(envelope::ok(json!({ "subscribed": false })))
}
