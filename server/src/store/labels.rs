use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AllocationError;
use crate::models::Label;

pub async fn create(
    pool: &PgPool,
    tenant_id: Uuid,
    inbox_id: Uuid,
    name: &str,
    color: Option<&str>,
) -> Result<Label, AllocationError> {
    sqlx::query_as::<_, Label>(
        "INSERT INTO labels (id, tenant_id, inbox_id, name, color) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING id, tenant_id, inbox_id, name, color, created_at",
    )
    .bind(Uuid::now_v7())
    .bind(tenant_id)
    .bind(inbox_id)
    .bind(name)
    .bind(color)
    .fetch_one(pool)
    .await
    .map_err(|e| AllocationError::from(e).on_unique("label", name.to_string()))
}

pub async fn get(pool: &PgPool, tenant_id: Uuid, id: Uuid) -> Result<Label, AllocationError> {
    sqlx::query_as::<_, Label>(
        "SELECT id, tenant_id, inbox_id, name, color, created_at \
         FROM labels WHERE id = $1 AND tenant_id = $2",
    )
    .bind(id)
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AllocationError::NotFound { entity: "label" })
}

pub async fn list(
    pool: &PgPool,
    tenant_id: Uuid,
    inbox_id: Option<Uuid>,
) -> Result<Vec<Label>, AllocationError> {
    let labels = match inbox_id {
        Some(inbox_id) => {
            sqlx::query_as::<_, Label>(
                "SELECT id, tenant_id, inbox_id, name, color, created_at \
                 FROM labels WHERE tenant_id = $1 AND inbox_id = $2 ORDER BY name",
            )
            .bind(tenant_id)
            .bind(inbox_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Label>(
                "SELECT id, tenant_id, inbox_id, name, color, created_at \
                 FROM labels WHERE tenant_id = $1 ORDER BY name",
            )
            .bind(tenant_id)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(labels)
}

pub async fn delete(pool: &PgPool, tenant_id: Uuid, id: Uuid) -> Result<(), AllocationError> {
    let result = sqlx::query("DELETE FROM labels WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(tenant_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AllocationError::NotFound { entity: "label" });
    }
    Ok(())
}

/// Attach a label to a conversation. Both rows are re-read inside one
/// transaction; the label must live in the conversation's inbox.
pub async fn attach(
    pool: &PgPool,
    tenant_id: Uuid,
    conversation_id: Uuid,
    label_id: Uuid,
) -> Result<(), AllocationError> {
    let mut tx = pool.begin().await?;

    let conv_inbox: Option<Uuid> =
        sqlx::query_scalar("SELECT inbox_id FROM conversations WHERE id = $1 AND tenant_id = $2")
            .bind(conversation_id)
            .bind(tenant_id)
            .fetch_optional(&mut *tx)
            .await?;
    let conv_inbox = conv_inbox.ok_or(AllocationError::NotFound {
        entity: "conversation",
    })?;

    let label_inbox: Option<Uuid> =
        sqlx::query_scalar("SELECT inbox_id FROM labels WHERE id = $1 AND tenant_id = $2")
            .bind(label_id)
            .bind(tenant_id)
            .fetch_optional(&mut *tx)
            .await?;
    let label_inbox = label_inbox.ok_or(AllocationError::NotFound { entity: "label" })?;

    if conv_inbox != label_inbox {
        return Err(AllocationError::InvalidRequest {
            reason: "label belongs to a different inbox than the conversation".into(),
        });
    }

    sqlx::query(
        "INSERT INTO conversation_labels (conversation_id, label_id) VALUES ($1, $2) \
         ON CONFLICT (conversation_id, label_id) DO NOTHING",
    )
    .bind(conversation_id)
    .bind(label_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn detach(
    pool: &PgPool,
    tenant_id: Uuid,
    conversation_id: Uuid,
    label_id: Uuid,
) -> Result<(), AllocationError> {
    sqlx::query(
        "DELETE FROM conversation_labels cl \
         USING conversations c \
         WHERE cl.conversation_id = $1 AND cl.label_id = $2 \
           AND c.id = cl.conversation_id AND c.tenant_id = $3",
    )
    .bind(conversation_id)
    .bind(label_id)
    .bind(tenant_id)
    .execute(pool)
    .await?;
    Ok(())
}
