//! Idempotency gate.
//!
//! Mutating requests that carry an `X-Idempotency-Key` header execute at
//! most once per `(tenant, key)` within the TTL: the first response with
//! status < 500 is recorded and replayed verbatim for retries, marked with
//! `X-Idempotency-Replay: true`. Reusing a key with a different body is a
//! client bug and fails with 422. 5xx responses are never recorded, so a
//! client retry after a transient failure re-executes.
//!
//! Concurrent first executions collapse on the unique `(tenant_id,
//! client_key)` index: the loser of the insert race returns the winner's
//! recorded response.

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::AllocationError;
use crate::identity::TENANT_HEADER;
use crate::models::IdempotencyRecord;
use crate::store;

pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";
pub const REPLAY_HEADER: &str = "x-idempotency-replay";

#[derive(Clone)]
pub struct IdempotencyGate {
    pool: PgPool,
    ttl: Duration,
}

impl IdempotencyGate {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }
}

fn request_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

fn replay_response(record: &IdempotencyRecord) -> Response {
    let status =
        StatusCode::from_u16(record.response_status as u16).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (
                header::HeaderName::from_static(REPLAY_HEADER),
                HeaderValue::from_static("true"),
            ),
        ],
        record.response_body.clone(),
    )
        .into_response()
}

pub async fn idempotency_middleware(
    State(gate): State<IdempotencyGate>,
    request: Request,
    next: Next,
) -> Response {
    if !matches!(request.method().as_str(), "POST" | "PUT" | "DELETE") {
        return next.run(request).await;
    }

    // The gate is scoped by tenant; without one it is disabled.
    let tenant_id = request
        .headers()
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok());
    let client_key = request
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let (Some(tenant_id), Some(client_key)) = (tenant_id, client_key) else {
        return next.run(request).await;
    };

    let (parts, body) = request.into_parts();
    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Failed to buffer request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    let hash = request_hash(&body_bytes);
    let endpoint = parts.uri.path().to_string();
    let method = parts.method.to_string();

    match store::idempotency::find(&gate.pool, tenant_id, &client_key).await {
        Ok(Some(record)) if record.expires_at > Utc::now() => {
            if record.request_hash != hash {
                warn!(
                    client_key = %client_key,
                    endpoint = %endpoint,
                    "Idempotency key reused with a different body"
                );
                return AllocationError::RequestHashMismatch.into_response();
            }
            debug!(client_key = %client_key, endpoint = %endpoint, "Replaying cached response");
            metrics::counter!("idempotency_replays_total", 1);
            return replay_response(&record);
        }
        Ok(Some(_expired)) => {
            if let Err(e) = store::idempotency::delete(&gate.pool, tenant_id, &client_key).await {
                error!(error = %e, "Failed to drop expired idempotency record");
            }
        }
        Ok(None) => {}
        Err(e) => {
            // Degrade to executing the request; the gate is best-effort on
            // lookup failure.
            error!(error = %e, "Idempotency lookup failed");
        }
    }

    let request = Request::from_parts(parts, Body::from(body_bytes));
    let response = next.run(request).await;
    let status = response.status();

    // Transient failures are not recorded; the client retries the same key.
    if status.as_u16() >= 500 {
        return response;
    }

    let (resp_parts, resp_body) = response.into_parts();
    let resp_bytes: Bytes = match axum::body::to_bytes(resp_body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let body_text = String::from_utf8_lossy(&resp_bytes);
    let record = store::idempotency::NewRecord {
        tenant_id,
        client_key: &client_key,
        endpoint: &endpoint,
        method: &method,
        request_hash: &hash,
        response_status: status.as_u16() as i32,
        response_body: &body_text,
        expires_at: Utc::now()
            + chrono::Duration::from_std(gate.ttl).unwrap_or(chrono::Duration::hours(24)),
    };

    match store::idempotency::insert(&gate.pool, record).await {
        Ok(true) => {}
        Ok(false) => {
            // Another replica recorded a result first; serve that one.
            if let Ok(Some(winner)) =
                store::idempotency::find(&gate.pool, tenant_id, &client_key).await
            {
                debug!(client_key = %client_key, "Insert race lost; replaying winner's response");
                return replay_response(&winner);
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to store idempotency record");
        }
    }

    Response::from_parts(resp_parts, Body::from(resp_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_body_sensitive() {
        let a = request_hash(b"{\"conversation_id\":\"x\"}");
        let b = request_hash(b"{\"conversation_id\":\"x\"}");
        let c = request_hash(b"{\"conversation_id\":\"y\"}");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_of_empty_body() {
        assert_eq!(
            request_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
