//! Transactional outbox for notification side effects.
//!
//! Mutation handlers never talk to a mailer or push gateway directly: they
//! append an event row inside the same transaction as the business write. A
//! separate notifier drains unpublished rows and marks them published after
//! delivery, which yields at-least-once semantics without coupling delivery
//! failures into the request path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn message_sent(message: &Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_type: "message".to_string(),
            aggregate_id: message.id,
            event_type: "message.sent".to_string(),
            payload: serde_json::json!({
                "message_id": message.id,
                "conversation_id": message.conversation_id,
                "sender_id": message.sender_id,
                "recipient_id": message.recipient_id,
                "subject": message.subject,
                "importance": message.importance,
                "sent_at": message.sent_at,
            }),
            created_at: Utc::now(),
            published_at: None,
        }
    }
}

pub struct OutboxRepository;

impl OutboxRepository {
    /// Insert within the caller's transaction so the event commits or rolls
    /// back together with the write it describes.
    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        event: &OutboxEvent,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO message_outbox \
             (id, aggregate_type, aggregate_id, event_type, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id)
        .bind(&event.aggregate_type)
        .bind(event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn fetch_unpublished(
        db: &Pool<Postgres>,
        limit: i64,
    ) -> Result<Vec<OutboxEvent>, AppError> {
        let rows = sqlx::query(
            "SELECT id, aggregate_type, aggregate_id, event_type, payload, \
                    created_at, published_at \
             FROM message_outbox WHERE published_at IS NULL \
             ORDER BY created_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| OutboxEvent {
                id: r.get("id"),
                aggregate_type: r.get("aggregate_type"),
                aggregate_id: r.get("aggregate_id"),
                event_type: r.get("event_type"),
                payload: r.get("payload"),
                created_at: r.get("created_at"),
                published_at: r.get("published_at"),
            })
            .collect())
    }

    pub async fn mark_published(db: &Pool<Postgres>, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE message_outbox SET published_at = NOW() \
             WHERE id = $1 AND published_at IS NULL",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }
}
