//! Idempotency reaper: deletes expired idempotency records so the table
//! stays bounded. No cross-replica coordination needed; deletes are
//! naturally idempotent.

use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::AllocationError;
use crate::store;

pub struct IdempotencyReaper {
    pool: PgPool,
    interval: Duration,
    batch_size: i64,
}

impl IdempotencyReaper {
    pub fn new(pool: PgPool, interval: Duration, batch_size: i64) -> Self {
        Self {
            pool,
            interval,
            batch_size,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "Idempotency reaper started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(0) => {}
                        Ok(deleted) => info!(deleted, "Expired idempotency records deleted"),
                        Err(e) => error!(error = %e, "Idempotency cleanup failed"),
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Idempotency reaper shutting down");
                    break;
                }
            }
        }
    }

    /// Delete in batches until the backlog is drained.
    pub async fn tick(&self) -> Result<u64, AllocationError> {
        let mut total = 0u64;
        loop {
            let deleted = store::idempotency::delete_expired(&self.pool, self.batch_size).await?;
            total += deleted;
            if deleted < self.batch_size as u64 {
                break;
            }
        }
        Ok(total)
    }
}
