//! Grace reclaimer: returns conversations to the queue once their owner's
//! grace window has lapsed.
//!
//! Each tick reads a batch of expired ticket ids without locking, then
//! settles every ticket in its own transaction: the ticket is re-claimed
//! with `FOR UPDATE SKIP LOCKED` (parallel replicas partition the work) and
//! the conversation is re-verified under a `NOWAIT` row lock before
//! anything moves. A contended or failing ticket ends its own transaction
//! right there, so one bad ticket never aborts the statements of its
//! siblings. A conversation never double-moves because ownership is checked
//! under the row lock.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AllocationError;
use crate::models::ConversationState;
use crate::priority;
use crate::store;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub swept: usize,
    pub requeued: usize,
    pub already_handled: usize,
    pub reassigned: usize,
    pub conversation_gone: usize,
    pub skipped: usize,
}

enum TicketOutcome {
    Requeued,
    AlreadyHandled,
    Reassigned,
    ConversationGone,
    /// Ticket taken by a peer replica, cancelled meanwhile, or its
    /// conversation row is locked by a live transaction; retry next tick.
    Skipped,
}

pub struct GraceReclaimer {
    pool: PgPool,
    interval: Duration,
    batch_size: i64,
}

impl GraceReclaimer {
    pub fn new(pool: PgPool, interval: Duration, batch_size: i64) -> Self {
        Self {
            pool,
            interval,
            batch_size,
        }
    }

    /// Run until the token is cancelled. Called from server startup.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "Grace reclaimer started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(stats) if stats.swept > 0 => {
                            info!(
                                swept = stats.swept,
                                requeued = stats.requeued,
                                already_handled = stats.already_handled,
                                reassigned = stats.reassigned,
                                gone = stats.conversation_gone,
                                skipped = stats.skipped,
                                "Grace sweep completed"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Grace sweep failed"),
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Grace reclaimer shutting down");
                    break;
                }
            }
        }
    }

    /// One sweep over a batch of expired tickets. Every ticket settles in
    /// its own transaction; a bad ticket is logged and skipped, never
    /// aborts the batch.
    pub async fn tick(&self) -> Result<SweepStats, AllocationError> {
        let candidates =
            store::grace_tickets::expired_candidates(&self.pool, Utc::now(), self.batch_size)
                .await?;

        let mut stats = SweepStats {
            swept: candidates.len(),
            ..SweepStats::default()
        };

        for ticket_id in candidates {
            match self.settle_one(ticket_id).await {
                Ok(TicketOutcome::Requeued) => stats.requeued += 1,
                Ok(TicketOutcome::AlreadyHandled) => stats.already_handled += 1,
                Ok(TicketOutcome::Reassigned) => stats.reassigned += 1,
                Ok(TicketOutcome::ConversationGone) => stats.conversation_gone += 1,
                Ok(TicketOutcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    stats.skipped += 1;
                    warn!(
                        ticket_id = %ticket_id,
                        error = %e,
                        "Failed to settle grace ticket; will retry next sweep"
                    );
                }
            }
        }

        metrics::counter!("grace_reclaims_total", stats.requeued as u64);
        Ok(stats)
    }

    /// Claim and settle a single ticket inside its own transaction. Every
    /// early return ends this transaction; no statement ever runs on a
    /// transaction a previous statement has aborted.
    async fn settle_one(&self, ticket_id: Uuid) -> Result<TicketOutcome, AllocationError> {
        let mut tx = self.pool.begin().await?;

        let Some(ticket) =
            store::grace_tickets::claim_expired(&mut tx, ticket_id, Utc::now()).await?
        else {
            return Ok(TicketOutcome::Skipped);
        };

        let mut conv =
            match store::conversations::lock_one_for_claim(&mut tx, ticket.conversation_id).await {
                Ok(conv) => conv,
                Err(AllocationError::NotFound { .. }) => {
                    store::grace_tickets::delete(&mut tx, ticket.id).await?;
                    tx.commit().await?;
                    return Ok(TicketOutcome::ConversationGone);
                }
                Err(AllocationError::ConversationLocked) => {
                    debug!(conversation_id = %ticket.conversation_id, "Row busy; deferring ticket");
                    tx.rollback().await?;
                    return Ok(TicketOutcome::Skipped);
                }
                Err(e) => return Err(e),
            };

        if conv.state != ConversationState::Allocated {
            store::grace_tickets::delete(&mut tx, ticket.id).await?;
            tx.commit().await?;
            return Ok(TicketOutcome::AlreadyHandled);
        }

        if conv.assigned_operator_id != Some(ticket.operator_id) {
            store::grace_tickets::delete(&mut tx, ticket.id).await?;
            tx.commit().await?;
            return Ok(TicketOutcome::Reassigned);
        }

        let tenant = store::tenants::get(&mut *tx, conv.tenant_id).await?;
        conv.state = ConversationState::Queued;
        conv.assigned_operator_id = None;
        conv.priority_score =
            priority::score_for(&tenant, conv.message_count, conv.last_message_at);
        conv.updated_at = Utc::now();
        store::conversations::update(&mut tx, &conv).await?;
        store::grace_tickets::delete(&mut tx, ticket.id).await?;
        tx.commit().await?;

        debug!(
            conversation_id = %conv.id,
            operator_id = %ticket.operator_id,
            "Grace window lapsed; conversation requeued"
        );
        Ok(TicketOutcome::Requeued)
    }
}
