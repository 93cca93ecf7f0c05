use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::envelope;
use crate::models::ConversationState;

/// Postgres error codes surfaced by the row-locking store primitives.
const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{entity} already exists: {detail}")]
    AlreadyExists { entity: &'static str, detail: String },

    #[error("illegal transition from {from} via {attempted}")]
    InvalidStateTransition {
        from: ConversationState,
        attempted: &'static str,
    },

    #[error("conversation row is locked by another transaction")]
    ConversationLocked,

    #[error("conversation was claimed by another operator")]
    ConversationAlreadyClaimed,

    #[error("conversation is not queued (state is {state})")]
    ConversationNotQueued { state: ConversationState },

    #[error("conversation is not allocated (state is {state})")]
    ConversationNotAllocated { state: ConversationState },

    #[error("operator is not AVAILABLE")]
    OperatorNotAvailable,

    #[error("operator has no inbox subscriptions")]
    NoSubscriptions,

    #[error("no queued conversations available")]
    NoConversationsAvailable,

    #[error("operator is not subscribed to inbox {inbox_id}")]
    NotSubscribedToInbox { inbox_id: Uuid },

    #[error("operator {operator_id} not found")]
    OperatorNotFound { operator_id: Uuid },

    #[error("operator {operator_id} is not subscribed to inbox {inbox_id}")]
    OperatorNotSubscribed { operator_id: Uuid, inbox_id: Uuid },

    #[error("inbox {inbox_id} not found")]
    InboxNotFound { inbox_id: Uuid },

    #[error("inbox belongs to a different tenant")]
    InboxDifferentTenant,

    #[error("requires {required} role")]
    InsufficientPermissions { required: &'static str },

    #[error("idempotency key was reused with a different request body")]
    RequestHashMismatch,

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AllocationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. }
            | Self::NoConversationsAvailable
            | Self::OperatorNotFound { .. }
            | Self::InboxNotFound { .. } => StatusCode::NOT_FOUND,
            Self::AlreadyExists { .. }
            | Self::InvalidStateTransition { .. }
            | Self::ConversationLocked
            | Self::ConversationAlreadyClaimed
            | Self::ConversationNotQueued { .. }
            | Self::ConversationNotAllocated { .. } => StatusCode::CONFLICT,
            Self::OperatorNotAvailable
            | Self::NoSubscriptions
            | Self::OperatorNotSubscribed { .. }
            | Self::InboxDifferentTenant
            | Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotSubscribedToInbox { .. } | Self::InsufficientPermissions { .. } => {
                StatusCode::FORBIDDEN
            }
            Self::RequestHashMismatch => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::ConversationLocked => "CONVERSATION_LOCKED",
            Self::ConversationAlreadyClaimed => "CONVERSATION_ALREADY_CLAIMED",
            Self::ConversationNotQueued { .. } => "CONVERSATION_NOT_QUEUED",
            Self::ConversationNotAllocated { .. } => "CONVERSATION_NOT_ALLOCATED",
            Self::OperatorNotAvailable => "OPERATOR_NOT_AVAILABLE",
            Self::NoSubscriptions => "NO_SUBSCRIPTIONS",
            Self::NoConversationsAvailable => "NO_CONVERSATIONS_AVAILABLE",
            Self::NotSubscribedToInbox { .. } => "NOT_SUBSCRIBED_TO_INBOX",
            Self::OperatorNotFound { .. } => "OPERATOR_NOT_FOUND",
            Self::OperatorNotSubscribed { .. } => "OPERATOR_NOT_SUBSCRIBED",
            Self::InboxNotFound { .. } => "INBOX_NOT_FOUND",
            Self::InboxDifferentTenant => "INBOX_DIFFERENT_TENANT",
            Self::InsufficientPermissions { .. } => "INSUFFICIENT_PERMISSIONS",
            Self::RequestHashMismatch => "REQUEST_HASH_MISMATCH",
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::Database(_) | Self::Internal(_) => "INTERNAL",
        }
    }

    /// Rewrite a sqlx unique-constraint violation into ALREADY_EXISTS.
    /// Everything else passes through untouched.
    pub fn on_unique(self, entity: &'static str, detail: impl Into<String>) -> Self {
        let is_unique_violation = matches!(
            &self,
            Self::Database(sqlx::Error::Database(db))
                if db.code().as_deref() == Some(PG_UNIQUE_VIOLATION)
        );
        if is_unique_violation {
            Self::AlreadyExists {
                entity,
                detail: detail.into(),
            }
        } else {
            self
        }
    }

    /// True when the underlying Postgres error is `lock_not_available`,
    /// i.e. a `FOR UPDATE NOWAIT` lost the race.
    pub fn is_lock_contention(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(PG_LOCK_NOT_AVAILABLE))
    }
}

impl IntoResponse for AllocationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        } else {
            tracing::debug!(error = %self, code = self.error_code(), "request rejected");
        }
        envelope::error_response(status, self.error_code(), &self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AllocationError::NotFound { entity: "conversation" }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AllocationError::NoConversationsAvailable.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AllocationError::ConversationAlreadyClaimed.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AllocationError::ConversationNotQueued {
                state: ConversationState::Allocated
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AllocationError::OperatorNotAvailable.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AllocationError::NoSubscriptions.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AllocationError::NotSubscribedToInbox {
                inbox_id: Uuid::nil()
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AllocationError::InsufficientPermissions { required: "MANAGER" }.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AllocationError::RequestHashMismatch.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AllocationError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_code_strings() {
        assert_eq!(
            AllocationError::ConversationAlreadyClaimed.error_code(),
            "CONVERSATION_ALREADY_CLAIMED"
        );
        assert_eq!(
            AllocationError::NoConversationsAvailable.error_code(),
            "NO_CONVERSATIONS_AVAILABLE"
        );
        assert_eq!(
            AllocationError::RequestHashMismatch.error_code(),
            "REQUEST_HASH_MISMATCH"
        );
        assert_eq!(
            AllocationError::InboxDifferentTenant.error_code(),
            "INBOX_DIFFERENT_TENANT"
        );
    }

    #[test]
    fn test_not_found_message_does_not_leak_tenant() {
        let err = AllocationError::NotFound { entity: "conversation" };
        assert_eq!(err.to_string(), "conversation not found");
    }
}
