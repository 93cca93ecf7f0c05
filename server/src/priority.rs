//! Priority scoring.
//!
//! `score = alpha * min(log10(message_count + 1) / 3, 1)
//!        + beta  * min(hours_since_last_message / 24, 1)`
//!
//! Both components clamp to [0, 1], so the score does too. The tenant
//! weights are fixed-precision decimals; they are converted to doubles here
//! and nowhere else.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AllocationError;
use crate::models::Tenant;

/// Largest tolerated drift of `alpha + beta` from 1.
const WEIGHT_SUM_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

/// Message volume saturates at 1000 messages (log10(1001)/3 ≈ 1).
const VOLUME_LOG_DIVISOR: f64 = 3.0;
/// Age saturates at a full day.
const AGE_HOURS_DIVISOR: f64 = 24.0;

pub fn score(
    message_count: i32,
    last_message_at: DateTime<Utc>,
    alpha: Decimal,
    beta: Decimal,
    now: DateTime<Utc>,
) -> f64 {
    let volume = ((f64::from(message_count.max(0)) + 1.0).log10() / VOLUME_LOG_DIVISOR).min(1.0);
    let hours = (now - last_message_at).num_seconds().max(0) as f64 / 3600.0;
    let age = (hours / AGE_HOURS_DIVISOR).min(1.0);

    let alpha = alpha.to_f64().unwrap_or(0.0);
    let beta = beta.to_f64().unwrap_or(0.0);

    (alpha * volume + beta * age).clamp(0.0, 1.0)
}

/// Score a conversation under its tenant's weights.
pub fn score_for(tenant: &Tenant, message_count: i32, last_message_at: DateTime<Utc>) -> f64 {
    score(message_count, last_message_at, tenant.alpha, tenant.beta, Utc::now())
}

/// Weight invariant: both in [0, 1] and summing to 1 within tolerance.
pub fn validate_weights(alpha: Decimal, beta: Decimal) -> Result<(), AllocationError> {
    let unit = Decimal::ZERO..=Decimal::ONE;
    if !unit.contains(&alpha) || !unit.contains(&beta) {
        return Err(AllocationError::InvalidRequest {
            reason: "alpha and beta must be within [0, 1]".into(),
        });
    }
    if (alpha + beta - Decimal::ONE).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(AllocationError::InvalidRequest {
            reason: "alpha + beta must equal 1 (±0.01)".into(),
        });
    }
    Ok(())
}

/// Recompute the stored score of every QUEUED conversation in a tenant.
/// Run after a weight change; rows transition through the one scorer above
/// rather than a second formula in SQL.
pub async fn recompute_queued_scores(
    pool: &PgPool,
    tenant: &Tenant,
) -> Result<u64, AllocationError> {
    let rows: Vec<(Uuid, i32, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, message_count, last_message_at \
         FROM conversations \
         WHERE tenant_id = $1 AND state = 'QUEUED'",
    )
    .bind(tenant.id)
    .fetch_all(pool)
    .await?;

    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let mut updated = 0u64;
    for (id, message_count, last_message_at) in rows {
        let new_score = score(message_count, last_message_at, tenant.alpha, tenant.beta, now);
        let result = sqlx::query(
            "UPDATE conversations SET priority_score = $1, updated_at = NOW() \
             WHERE id = $2 AND state = 'QUEUED'",
        )
        .bind(new_score)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        updated += result.rows_affected();
    }
    tx.commit().await?;

    tracing::info!(tenant_id = %tenant.id, updated, "Recomputed queued priority scores");
    Ok(updated)
}
