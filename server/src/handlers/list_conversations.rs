use axum::extract::{Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope;
use crate::error::AllocationError;
use crate::identity::CallerIdentity;
use crate::models::{Conversation, ConversationState};
use crate::pagination::{self, Cursor, SortOrder};
use crate::state::AppState;
use crate::store;
use crate::store::conversations::ConversationFilters;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub state: Option<ConversationState>,
    pub inbox_id: Option<Uuid>,
    pub operator_id: Option<Uuid>,
    pub label_id: Option<Uuid>,
    pub sort: Option<String>,
    pub cursor: Option<String>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub conversations: Vec<Conversation>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// GET /api/v1/conversations
///
/// OPERATOR-role callers only see inboxes they are subscribed to; managers
/// and admins see the whole tenant.
pub async fn list_conversations(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<ListQuery>,
) -> Result<Response, AllocationError> {
    let sort = SortOrder::parse(query.sort.as_deref())?;
    let cursor = query.cursor.as_deref().map(Cursor::decode).transpose()?;

    let visible_inboxes = if caller.role.is_supervisor() {
        None
    } else {
        let subscribed =
            store::operators::subscription_inboxes(&state.pool, caller.operator_id).await?;
        if subscribed.is_empty() {
            return Ok(envelope::ok(ListResponse {
                conversations: Vec::new(),
                has_more: false,
                cursor: None,
            }));
        }
        Some(subscribed)
    };

    let filters = ConversationFilters {
        inbox_id: query.inbox_id,
        state: query.state,
        assigned_operator_id: query.operator_id,
        label_id: query.label_id,
        visible_inboxes,
        sort,
        cursor,
        per_page: pagination::clamp_per_page(query.per_page),
    };

    let (conversations, has_more) =
        store::conversations::list_with_filters(&state.pool, caller.tenant_id, &filters).await?;

    let cursor = if has_more {
        conversations
            .last()
            .map(|last| store::conversations::cursor_for(last, sort).encode())
    } else {
        None
    };

    Ok(envelope::ok(ListResponse {
        conversations,
        has_more,
        cursor,
    }))
}
