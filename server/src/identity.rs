//! Caller identity extractors.
//!
//! The transport constructs identity once per request from headers and
//! threads it through the call graph as an explicit value; nothing reads
//! ambient request state further down.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AllocationError;
use crate::models::OperatorRole;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const OPERATOR_HEADER: &str = "x-operator-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tenant scope for routes that are not operator-scoped (ingester inserts,
/// label listing).
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub correlation_id: String,
}

/// Full caller identity for operator-scoped routes. The role is loaded from
/// the operators table on every request; a tenant mismatch surfaces as
/// NOT_FOUND so callers cannot probe other tenants' operator ids.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub tenant_id: Uuid,
    pub operator_id: Uuid,
    pub role: OperatorRole,
    pub correlation_id: String,
}

impl CallerIdentity {
    pub fn require_supervisor(&self) -> Result<(), AllocationError> {
        if self.role.is_supervisor() {
            Ok(())
        } else {
            Err(AllocationError::InsufficientPermissions {
                required: "MANAGER",
            })
        }
    }

    pub fn require_admin(&self) -> Result<(), AllocationError> {
        if self.role == OperatorRole::Admin {
            Ok(())
        } else {
            Err(AllocationError::InsufficientPermissions { required: "ADMIN" })
        }
    }
}

fn header_uuid(parts: &Parts, name: &'static str) -> Result<Uuid, AllocationError> {
    let raw = parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AllocationError::InvalidRequest {
            reason: format!("missing {} header", name),
        })?;
    Uuid::parse_str(raw).map_err(|_| AllocationError::InvalidRequest {
        reason: format!("{} header is not a valid UUID", name),
    })
}

fn correlation_id(parts: &Parts) -> String {
    parts
        .headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::now_v7().to_string())
}

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AllocationError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(TenantContext {
            tenant_id: header_uuid(parts, TENANT_HEADER)?,
            correlation_id: correlation_id(parts),
        })
    }
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    PgPool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AllocationError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = header_uuid(parts, TENANT_HEADER)?;
        let operator_id = header_uuid(parts, OPERATOR_HEADER)?;
        let pool = PgPool::from_ref(state);

        let row: Option<(Uuid, OperatorRole)> =
            sqlx::query_as("SELECT tenant_id, role FROM operators WHERE id = $1")
                .bind(operator_id)
                .fetch_optional(&pool)
                .await?;

        match row {
            Some((op_tenant, role)) if op_tenant == tenant_id => Ok(CallerIdentity {
                tenant_id,
                operator_id,
                role,
                correlation_id: correlation_id(parts),
            }),
            _ => Err(AllocationError::NotFound { entity: "operator" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(role: OperatorRole) -> CallerIdentity {
        CallerIdentity {
            tenant_id: Uuid::now_v7(),
            operator_id: Uuid::now_v7(),
            role,
            correlation_id: "test".into(),
        }
    }

    #[test]
    fn supervisor_gate() {
        assert!(caller(OperatorRole::Operator).require_supervisor().is_err());
        assert!(caller(OperatorRole::Manager).require_supervisor().is_ok());
        assert!(caller(OperatorRole::Admin).require_supervisor().is_ok());
    }

    #[test]
    fn admin_gate() {
        assert!(caller(OperatorRole::Manager).require_admin().is_err());
        assert!(caller(OperatorRole::Admin).require_admin().is_ok());
    }
}
