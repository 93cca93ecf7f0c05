//! Tenant bootstrap and priority-weight administration.

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope;
use crate::error::AllocationError;
use crate::identity::{CallerIdentity, TenantContext};
use crate::models::Tenant;
use crate::priority;
use crate::state::AppState;
use crate::store;

/// Weights travel as doubles on the wire and as fixed-precision decimals
/// everywhere else.
#[derive(Debug, Serialize)]
pub struct TenantView {
    pub id: Uuid,
    pub name: String,
    pub alpha: f64,
    pub beta: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Tenant> for TenantView {
    fn from(t: Tenant) -> Self {
        TenantView {
            id: t.id,
            name: t.name,
            alpha: t.alpha.to_f64().unwrap_or(0.0),
            beta: t.beta.to_f64().unwrap_or(0.0),
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

fn to_weight(value: f64, name: &str) -> Result<Decimal, AllocationError> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(2))
        .ok_or_else(|| AllocationError::InvalidRequest {
            reason: format!("{} is not a valid weight", name),
        })
}

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    pub alpha: f64,
    pub beta: f64,
}

/// POST /api/v1/tenants — bootstrap; there is no cross-tenant identity to
/// gate this on.
pub async fn create_tenant(
    State(state): State<AppState>,
    Json(body): Json<CreateTenantRequest>,
) -> Result<Response, AllocationError> {
    let alpha = to_weight(body.alpha, "alpha")?;
    let beta = to_weight(body.beta, "beta")?;
    priority::validate_weights(alpha, beta)?;

    let tenant = store::tenants::create(&state.pool, &body.name, alpha, beta).await?;
    Ok(envelope::created(TenantView::from(tenant)))
}

/// GET /api/v1/tenant
pub async fn get_tenant(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> Result<Response, AllocationError> {
    let tenant = store::tenants::get(&state.pool, ctx.tenant_id).await?;
    Ok(envelope::ok(TenantView::from(tenant)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateWeightsRequest {
    pub alpha: f64,
    pub beta: f64,
}

/// PUT /api/v1/tenant/weights — ADMIN only; re-scores the queued backlog so
/// the new weights take effect on the very next allocation.
pub async fn update_tenant_weights(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<UpdateWeightsRequest>,
) -> Result<Response, AllocationError> {
    caller.require_admin()?;

    let alpha = to_weight(body.alpha, "alpha")?;
    let beta = to_weight(body.beta, "beta")?;
    priority::validate_weights(alpha, beta)?;

    let tenant = store::tenants::update_weights(&state.pool, caller.tenant_id, alpha, beta).await?;
    priority::recompute_queued_scores(&state.pool, &tenant).await?;
    Ok(envelope::ok(TenantView::from(tenant)))
}
