//! Database row models for the allocation engine.
//!
//! Enums are stored as TEXT with CHECK constraints; sqlx maps them by
//! variant name (SCREAMING_SNAKE_CASE).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationState {
    Queued,
    Allocated,
    Resolved,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Queued => "QUEUED",
            ConversationState::Allocated => "ALLOCATED",
            ConversationState::Resolved => "RESOLVED",
        }
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorRole {
    Operator,
    Manager,
    Admin,
}

impl OperatorRole {
    /// MANAGER and ADMIN may act on conversations they do not own.
    pub fn is_supervisor(&self) -> bool {
        matches!(self, OperatorRole::Manager | OperatorRole::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorPresence {
    Available,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GraceReason {
    Offline,
    Manual,
}

// =============================================================================
// Rows
// =============================================================================

/// Maps to `tenants`. Priority weights are fixed-precision; they become
/// doubles only at the API boundary.
#[derive(Debug, Clone, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub alpha: Decimal,
    pub beta: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Inbox {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub phone_number: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Operator {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub display_name: String,
    pub role: OperatorRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OperatorStatus {
    pub operator_id: Uuid,
    pub status: OperatorPresence,
    pub last_change_at: DateTime<Utc>,
}

/// The central entity. State invariants:
/// QUEUED has no owner and no resolved_at; ALLOCATED has an owner;
/// RESOLVED is terminal and carries resolved_at.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub inbox_id: Uuid,
    pub external_id: String,
    pub customer_phone: String,
    pub state: ConversationState,
    pub assigned_operator_id: Option<Uuid>,
    pub last_message_at: DateTime<Utc>,
    pub message_count: i32,
    pub priority_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Pending reclaim work for an ALLOCATED conversation whose owner went
/// OFFLINE. Not authoritative: the reclaimer re-verifies ownership before
/// touching the conversation.
#[derive(Debug, Clone, FromRow)]
pub struct GraceTicket {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub operator_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub reason: GraceReason,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Label {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub inbox_id: Uuid,
    pub name: String,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Cached result of a mutating request, keyed by `(tenant_id, client_key)`.
/// `response_body` is stored verbatim so a replay is byte-identical.
#[derive(Debug, Clone, FromRow)]
pub struct IdempotencyRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub client_key: String,
    pub endpoint: String,
    pub method: String,
    pub request_hash: String,
    pub response_status: i32,
    pub response_body: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_screaming() {
        let s = serde_json::to_string(&ConversationState::Queued).unwrap();
        assert_eq!(s, "\"QUEUED\"");
        let back: ConversationState = serde_json::from_str("\"ALLOCATED\"").unwrap();
        assert_eq!(back, ConversationState::Allocated);
    }

    #[test]
    fn supervisor_roles() {
        assert!(!OperatorRole::Operator.is_supervisor());
        assert!(OperatorRole::Manager.is_supervisor());
        assert!(OperatorRole::Admin.is_supervisor());
    }
}
