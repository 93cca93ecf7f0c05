//! Conversation store: CRUD plus the two row-locking primitives that make
//! allocation safe under contention.
//!
//! `pick_next_for_allocation` uses `FOR UPDATE SKIP LOCKED` so N concurrent
//! allocators each obtain a different row without blocking on each other.
//! `lock_one_for_claim` uses `FOR UPDATE NOWAIT` so a losing claimer fails
//! immediately instead of queueing on the winner's lock.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::error::AllocationError;
use crate::models::{Conversation, ConversationState};
use crate::pagination::{Cursor, SortOrder};

const ALL_COLUMNS: &str = "id, tenant_id, inbox_id, external_id, customer_phone, state, \
     assigned_operator_id, last_message_at, message_count, priority_score, \
     created_at, updated_at, resolved_at";

#[derive(Debug, Clone)]
pub struct NewConversation {
    pub tenant_id: Uuid,
    pub inbox_id: Uuid,
    pub external_id: String,
    pub customer_phone: String,
    pub last_message_at: DateTime<Utc>,
    pub message_count: i32,
    pub priority_score: f64,
}

pub async fn create(
    pool: &PgPool,
    new: NewConversation,
) -> Result<Conversation, AllocationError> {
    let query = format!(
        "INSERT INTO conversations \
           (id, tenant_id, inbox_id, external_id, customer_phone, state, \
            last_message_at, message_count, priority_score) \
         VALUES ($1, $2, $3, $4, $5, 'QUEUED', $6, $7, $8) \
         RETURNING {ALL_COLUMNS}"
    );
    sqlx::query_as::<_, Conversation>(&query)
        .bind(Uuid::now_v7())
        .bind(new.tenant_id)
        .bind(new.inbox_id)
        .bind(&new.external_id)
        .bind(&new.customer_phone)
        .bind(new.last_message_at)
        .bind(new.message_count)
        .bind(new.priority_score)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            AllocationError::from(e).on_unique("conversation", new.external_id.clone())
        })
}

/// Fetch under tenant check; a cross-tenant id reads as absent.
pub async fn get(
    pool: &PgPool,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Conversation, AllocationError> {
    let query = format!("SELECT {ALL_COLUMNS} FROM conversations WHERE id = $1 AND tenant_id = $2");
    sqlx::query_as::<_, Conversation>(&query)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AllocationError::NotFound {
            entity: "conversation",
        })
}

/// Full-row update of the mutable fields. Callers hold the row lock.
pub async fn update(
    tx: &mut Transaction<'_, Postgres>,
    conv: &Conversation,
) -> Result<Conversation, AllocationError> {
    let query = format!(
        "UPDATE conversations SET \
           inbox_id = $2, state = $3, assigned_operator_id = $4, \
           last_message_at = $5, message_count = $6, priority_score = $7, \
           updated_at = $8, resolved_at = $9 \
         WHERE id = $1 \
         RETURNING {ALL_COLUMNS}"
    );
    Ok(sqlx::query_as::<_, Conversation>(&query)
        .bind(conv.id)
        .bind(conv.inbox_id)
        .bind(conv.state)
        .bind(conv.assigned_operator_id)
        .bind(conv.last_message_at)
        .bind(conv.message_count)
        .bind(conv.priority_score)
        .bind(conv.updated_at)
        .bind(conv.resolved_at)
        .fetch_one(&mut **tx)
        .await?)
}

/// Pick up to `limit` QUEUED conversations in allocation order, exclusively
/// locking them until the transaction ends. Rows locked by concurrent
/// transactions are skipped, never waited on.
pub async fn pick_next_for_allocation(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    inbox_ids: &[Uuid],
    limit: i64,
) -> Result<Vec<Conversation>, AllocationError> {
    let query = format!(
        "SELECT {ALL_COLUMNS} FROM conversations \
         WHERE tenant_id = $1 AND inbox_id = ANY($2) AND state = 'QUEUED' \
         ORDER BY priority_score DESC, last_message_at ASC, id ASC \
         LIMIT $3 \
         FOR UPDATE SKIP LOCKED"
    );
    Ok(sqlx::query_as::<_, Conversation>(&query)
        .bind(tenant_id)
        .bind(inbox_ids)
        .bind(limit)
        .fetch_all(&mut **tx)
        .await?)
}

/// Exclusively lock one row for a manual claim. Fails with
/// `CONVERSATION_LOCKED` the instant another transaction holds the lock.
pub async fn lock_one_for_claim(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Conversation, AllocationError> {
    let query = format!("SELECT {ALL_COLUMNS} FROM conversations WHERE id = $1 FOR UPDATE NOWAIT");
    let row = sqlx::query_as::<_, Conversation>(&query)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await;

    match row {
        Ok(Some(conv)) => Ok(conv),
        Ok(None) => Err(AllocationError::NotFound {
            entity: "conversation",
        }),
        Err(e) if AllocationError::is_lock_contention(&e) => {
            Err(AllocationError::ConversationLocked)
        }
        Err(e) => Err(e.into()),
    }
}

/// Plain `FOR UPDATE` re-read for lifecycle transitions; blocks until any
/// short-lived peer lock releases.
pub async fn lock_for_update(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Conversation, AllocationError> {
    let query =
        format!("SELECT {ALL_COLUMNS} FROM conversations WHERE id = $1 AND tenant_id = $2 FOR UPDATE");
    sqlx::query_as::<_, Conversation>(&query)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AllocationError::NotFound {
            entity: "conversation",
        })
}

/// All conversations currently ALLOCATED to an operator, locked for the
/// caller's transaction (used when installing grace tickets).
pub async fn lock_allocated_to(
    tx: &mut Transaction<'_, Postgres>,
    operator_id: Uuid,
) -> Result<Vec<Conversation>, AllocationError> {
    let query = format!(
        "SELECT {ALL_COLUMNS} FROM conversations \
         WHERE assigned_operator_id = $1 AND state = 'ALLOCATED' \
         FOR UPDATE"
    );
    Ok(sqlx::query_as::<_, Conversation>(&query)
        .bind(operator_id)
        .fetch_all(&mut **tx)
        .await?)
}

/// Bump message bookkeeping from the upstream-ingester hook and store the
/// freshly computed score.
pub async fn record_message(
    pool: &PgPool,
    tenant_id: Uuid,
    id: Uuid,
    received_at: DateTime<Utc>,
    new_score: f64,
) -> Result<Conversation, AllocationError> {
    let query = format!(
        "UPDATE conversations SET \
           message_count = message_count + 1, \
           last_message_at = GREATEST(last_message_at, $3), \
           priority_score = $4, \
           updated_at = NOW() \
         WHERE id = $1 AND tenant_id = $2 \
         RETURNING {ALL_COLUMNS}"
    );
    sqlx::query_as::<_, Conversation>(&query)
        .bind(id)
        .bind(tenant_id)
        .bind(received_at)
        .bind(new_score)
        .fetch_optional(pool)
        .await?
        .ok_or(AllocationError::NotFound {
            entity: "conversation",
        })
}

// =============================================================================
// Listing
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct ConversationFilters {
    pub inbox_id: Option<Uuid>,
    pub state: Option<ConversationState>,
    pub assigned_operator_id: Option<Uuid>,
    pub label_id: Option<Uuid>,
    /// When set, only these inboxes are visible (OPERATOR-role callers are
    /// restricted to their subscription set).
    pub visible_inboxes: Option<Vec<Uuid>>,
    pub sort: SortOrder,
    pub cursor: Option<Cursor>,
    pub per_page: i64,
}

/// Keyset-paginated listing. Fetches one row past the page so `has_more`
/// is exact.
pub async fn list_with_filters(
    pool: &PgPool,
    tenant_id: Uuid,
    filters: &ConversationFilters,
) -> Result<(Vec<Conversation>, bool), AllocationError> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT c.id, c.tenant_id, c.inbox_id, c.external_id, c.customer_phone, c.state, \
            c.assigned_operator_id, c.last_message_at, c.message_count, c.priority_score, \
            c.created_at, c.updated_at, c.resolved_at \
         FROM conversations c",
    );

    if filters.label_id.is_some() {
        qb.push(" JOIN conversation_labels cl ON cl.conversation_id = c.id");
    }

    qb.push(" WHERE c.tenant_id = ").push_bind(tenant_id);

    if let Some(inbox_id) = filters.inbox_id {
        qb.push(" AND c.inbox_id = ").push_bind(inbox_id);
    }
    if let Some(state) = filters.state {
        qb.push(" AND c.state = ").push_bind(state);
    }
    if let Some(operator_id) = filters.assigned_operator_id {
        qb.push(" AND c.assigned_operator_id = ").push_bind(operator_id);
    }
    if let Some(label_id) = filters.label_id {
        qb.push(" AND cl.label_id = ").push_bind(label_id);
    }
    if let Some(visible) = &filters.visible_inboxes {
        qb.push(" AND c.inbox_id = ANY(").push_bind(visible.clone()).push(")");
    }

    if let Some(cursor) = &filters.cursor {
        push_cursor_predicate(&mut qb, filters.sort, cursor);
    }

    match filters.sort {
        SortOrder::Newest => qb.push(" ORDER BY c.last_message_at DESC, c.id DESC"),
        SortOrder::Oldest => qb.push(" ORDER BY c.last_message_at ASC, c.id ASC"),
        SortOrder::Priority => {
            qb.push(" ORDER BY c.priority_score DESC, c.last_message_at ASC, c.id ASC")
        }
    };

    qb.push(" LIMIT ").push_bind(filters.per_page + 1);

    let rows = qb
        .build_query_as::<Conversation>()
        .fetch_all(pool)
        .await?;

    Ok(crate::pagination::trim_page(rows, filters.per_page))
}

fn push_cursor_predicate(qb: &mut QueryBuilder<Postgres>, sort: SortOrder, cursor: &Cursor) {
    match sort {
        SortOrder::Newest => {
            qb.push(" AND (c.last_message_at, c.id) < (")
                .push_bind(cursor.ts)
                .push(", ")
                .push_bind(cursor.id)
                .push(")");
        }
        SortOrder::Oldest => {
            qb.push(" AND (c.last_message_at, c.id) > (")
                .push_bind(cursor.ts)
                .push(", ")
                .push_bind(cursor.id)
                .push(")");
        }
        SortOrder::Priority => {
            // Mixed sort directions rule out a row-value comparison.
            let score = cursor.score.unwrap_or(0.0);
            qb.push(" AND (c.priority_score < ")
                .push_bind(score)
                .push(" OR (c.priority_score = ")
                .push_bind(score)
                .push(" AND (c.last_message_at > ")
                .push_bind(cursor.ts)
                .push(" OR (c.last_message_at = ")
                .push_bind(cursor.ts)
                .push(" AND c.id > ")
                .push_bind(cursor.id)
                .push("))))");
        }
    }
}

/// Sort-key cursor for the last row of a page.
pub fn cursor_for(conv: &Conversation, sort: SortOrder) -> Cursor {
    Cursor {
        score: matches!(sort, SortOrder::Priority).then_some(conv.priority_score),
        ts: conv.last_message_at,
        id: conv.id,
    }
}
