use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::config::AttachmentPolicy;
use crate::error::AppError;
use crate::models::attachment::Attachment;
use crate::models::message::{reply_subject, Importance, Message, Side};
use crate::models::User;
use crate::services::conversation_service::ConversationService;
use crate::services::outbox::{OutboxEvent, OutboxRepository};
use crate::storage::{new_storage_key, FileStore};

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, recipient_id, subject, body, \
     importance, sent_at, is_read, archived_by_sender, archived_by_recipient, \
     deleted_by_sender, deleted_by_recipient";

const MAX_SUBJECT_CHARS: usize = 500;

/// Attachment bytes plus the client-supplied name, already decoded from the
/// transport encoding by the route layer.
pub struct AttachmentUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub struct Composition {
    pub recipient_id: Uuid,
    pub subject: Option<String>,
    pub body: String,
    pub importance: Importance,
    pub attachments: Vec<AttachmentUpload>,
    /// Supplied for replies; otherwise the two-party conversation is
    /// resolved (or created) from the sender/recipient pair.
    pub conversation_id: Option<Uuid>,
}

/// The four visibility-filtered list views. Each predicate combines the
/// per-side archive/delete flags for the listing user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListView {
    Inbox,
    All,
    Sent,
    Archived,
}

pub struct MessageService;

impl MessageService {
    /// Compose a message. Message row, attachment rows, conversation touch
    /// and the outbox event commit in a single transaction; attachment bytes
    /// written to the file store are removed again if the transaction fails.
    pub async fn compose(
        db: &Pool<Postgres>,
        storage: &dyn FileStore,
        policy: &AttachmentPolicy,
        sender_id: Uuid,
        input: Composition,
    ) -> Result<Message, AppError> {
        Self::validate(&input, sender_id, policy)?;

        // Store bytes up front so the transaction only writes metadata.
        let mut stored: Vec<(String, String, Option<i64>)> =
            Vec::with_capacity(input.attachments.len());
        for upload in &input.attachments {
            let key = new_storage_key(&upload.file_name);
            let size = storage.put(&key, &upload.bytes).await?;
            stored.push((key, upload.file_name.clone(), size));
        }

        match Self::compose_in_tx(db, sender_id, &input, &stored).await {
            Ok(message) => Ok(message),
            Err(e) => {
                // Roll the stored files back best-effort; the rows are gone
                // with the transaction.
                for (key, _, _) in &stored {
                    if let Err(cleanup) = storage.remove(key).await {
                        tracing::warn!(%key, error = %cleanup, "orphaned attachment file after failed compose");
                    }
                }
                Err(e)
            }
        }
    }

    async fn compose_in_tx(
        db: &Pool<Postgres>,
        sender_id: Uuid,
        input: &Composition,
        stored: &[(String, String, Option<i64>)],
    ) -> Result<Message, AppError> {
        let mut tx = db.begin().await?;

        // Fail with a field error rather than an FK violation when the
        // recipient id does not resolve to a known user.
        let recipient: Option<User> = sqlx::query_as(
            "SELECT id, username, display_name, created_at FROM users WHERE id = $1",
        )
        .bind(input.recipient_id)
        .fetch_optional(&mut *tx)
        .await?;
        if recipient.is_none() {
            return Err(AppError::validation("recipient", "unknown recipient"));
        }

        let conversation_id = match input.conversation_id {
            Some(id) => {
                // Both parties must already belong to the supplied
                // conversation; anything else reads as nonexistent.
                let sender_in =
                    ConversationService::is_participant(&mut *tx, id, sender_id).await?;
                let recipient_in =
                    ConversationService::is_participant(&mut *tx, id, input.recipient_id).await?;
                if !sender_in || !recipient_in {
                    return Err(AppError::NotFound);
                }
                id
            }
            None => {
                ConversationService::get_or_create_direct_tx(&mut tx, sender_id, input.recipient_id)
                    .await?
                    .id
            }
        };

        let message_id = Uuid::new_v4();
        let row = sqlx::query(&format!(
            "INSERT INTO messages (id, conversation_id, sender_id, recipient_id, subject, body, importance) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message_id)
        .bind(conversation_id)
        .bind(sender_id)
        .bind(input.recipient_id)
        .bind(&input.subject)
        .bind(&input.body)
        .bind(input.importance.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let message = message_from_row(&row);

        for (key, name, size) in stored {
            sqlx::query(
                "INSERT INTO message_attachments \
                 (id, message_id, storage_key, original_name, size_bytes, uploaded_by) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(Uuid::new_v4())
            .bind(message_id)
            .bind(key)
            .bind(name)
            .bind(size)
            .bind(sender_id)
            .execute(&mut *tx)
            .await?;
        }

        ConversationService::touch(&mut tx, conversation_id).await?;
        OutboxRepository::insert(&mut tx, &OutboxEvent::message_sent(&message)).await?;

        tx.commit().await?;

        tracing::info!(
            message_id = %message.id,
            conversation_id = %conversation_id,
            attachments = stored.len(),
            "message composed"
        );
        Ok(message)
    }

    /// Reply to a message the sender can see. Recipient is the counterpart,
    /// the conversation is inherited (or resolved for rows predating
    /// conversation grouping), and the subject defaults to "Re: <original>".
    pub async fn reply(
        db: &Pool<Postgres>,
        storage: &dyn FileStore,
        policy: &AttachmentPolicy,
        original_id: Uuid,
        sender_id: Uuid,
        body: String,
        subject: Option<String>,
        attachments: Vec<AttachmentUpload>,
    ) -> Result<Message, AppError> {
        let original = Self::fetch(db, original_id).await?;
        if !original.visible_to(sender_id) {
            return Err(AppError::NotFound);
        }
        let recipient_id = original
            .counterpart_of(sender_id)
            .ok_or(AppError::NotFound)?;

        let subject =
            subject.unwrap_or_else(|| reply_subject(original.subject.as_deref()));

        Self::compose(
            db,
            storage,
            policy,
            sender_id,
            Composition {
                recipient_id,
                subject: Some(subject),
                body,
                importance: Importance::Normal,
                attachments,
                conversation_id: original.conversation_id,
            },
        )
        .await
    }

    /// Detail view. Visibility is per side; the first retrieval by the
    /// recipient flips `is_read` (one-way, idempotent afterwards).
    pub async fn get_message(
        db: &Pool<Postgres>,
        user_id: Uuid,
        message_id: Uuid,
    ) -> Result<(Message, Vec<Attachment>), AppError> {
        let mut message = Self::fetch(db, message_id).await?;
        let side = message
            .side_of(user_id)
            .filter(|s| !message.deleted_on(*s))
            .ok_or(AppError::NotFound)?;

        if side == Side::Recipient && !message.is_read {
            sqlx::query("UPDATE messages SET is_read = TRUE WHERE id = $1 AND recipient_id = $2")
                .bind(message_id)
                .bind(user_id)
                .execute(db)
                .await?;
            message.is_read = true;
        }

        let attachments = Self::attachments_for(db, message_id).await?;
        Ok((message, attachments))
    }

    /// Explicit read marker for API callers; recipient-only.
    pub async fn mark_read(
        db: &Pool<Postgres>,
        user_id: Uuid,
        message_id: Uuid,
    ) -> Result<(), AppError> {
        let message = Self::fetch(db, message_id).await?;
        match message.side_of(user_id) {
            Some(Side::Recipient) if !message.deleted_by_recipient => {}
            Some(Side::Sender) if !message.deleted_by_sender => {
                return Err(AppError::Forbidden)
            }
            _ => return Err(AppError::NotFound),
        }
        sqlx::query("UPDATE messages SET is_read = TRUE WHERE id = $1")
            .bind(message_id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Archive or unarchive the acting side. The other side's flags are
    /// untouched, so archive/unarchive round-trips per side.
    pub async fn set_archived(
        db: &Pool<Postgres>,
        user_id: Uuid,
        message_id: Uuid,
        archived: bool,
    ) -> Result<(), AppError> {
        let message = Self::fetch(db, message_id).await?;
        let side = message
            .side_of(user_id)
            .filter(|s| !message.deleted_on(*s))
            .ok_or(AppError::NotFound)?;

        let column = match side {
            Side::Sender => "archived_by_sender",
            Side::Recipient => "archived_by_recipient",
        };
        sqlx::query(&format!("UPDATE messages SET {column} = $1 WHERE id = $2"))
            .bind(archived)
            .bind(message_id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Soft-delete for the acting side; irreversible for that side. When the
    /// second side deletes, the row is purged and attachment files removed.
    pub async fn delete(
        db: &Pool<Postgres>,
        storage: &dyn FileStore,
        user_id: Uuid,
        message_id: Uuid,
    ) -> Result<(), AppError> {
        let mut tx = db.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 FOR UPDATE"
        ))
        .bind(message_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;
        let message = message_from_row(&row);

        let side = message
            .side_of(user_id)
            .filter(|s| !message.deleted_on(*s))
            .ok_or(AppError::NotFound)?;
        let other_side_deleted = match side {
            Side::Sender => message.deleted_by_recipient,
            Side::Recipient => message.deleted_by_sender,
        };

        if other_side_deleted {
            // Both parties have now deleted: purge. Attachment rows cascade.
            let keys: Vec<String> = sqlx::query_scalar(
                "SELECT storage_key FROM message_attachments WHERE message_id = $1",
            )
            .bind(message_id)
            .fetch_all(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM messages WHERE id = $1")
                .bind(message_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            for key in keys {
                if let Err(e) = storage.remove(&key).await {
                    tracing::warn!(%key, error = %e, "failed to remove purged attachment file");
                }
            }
            tracing::info!(message_id = %message_id, "message purged (deleted by both parties)");
        } else {
            let column = match side {
                Side::Sender => "deleted_by_sender",
                Side::Recipient => "deleted_by_recipient",
            };
            sqlx::query(&format!(
                "UPDATE messages SET {column} = TRUE WHERE id = $1"
            ))
            .bind(message_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
        }

        Ok(())
    }

    /// One of the four visibility-filtered list views, newest first. `q`
    /// filters case-insensitively on subject, body, or the counterpart's
    /// display name, after the visibility predicate.
    pub async fn list(
        db: &Pool<Postgres>,
        user_id: Uuid,
        view: ListView,
        q: Option<&str>,
    ) -> Result<Vec<crate::routes::messages::MessageSummary>, AppError> {
        let pattern = q
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));

        let counterpart_name =
            "CASE WHEN m.sender_id = $1 THEN ru.display_name ELSE su.display_name END";
        let select = format!(
            "SELECT m.id, m.conversation_id, m.subject, m.body, m.importance, m.sent_at, m.is_read, \
                    CASE WHEN m.sender_id = $1 THEN m.recipient_id ELSE m.sender_id END AS counterpart_id, \
                    {counterpart_name} AS counterpart_name \
             FROM messages m \
             JOIN users su ON su.id = m.sender_id \
             JOIN users ru ON ru.id = m.recipient_id"
        );
        let search = format!(
            "($2::text IS NULL OR m.subject ILIKE $2 OR m.body ILIKE $2 OR {counterpart_name} ILIKE $2)"
        );

        let sql = match view {
            ListView::All => format!(
                "{select} WHERE {} AND {search} ORDER BY m.sent_at DESC",
                Self::predicate_all()
            ),
            ListView::Sent => format!(
                "{select} WHERE {} AND {search} ORDER BY m.sent_at DESC",
                Self::predicate_sent()
            ),
            ListView::Archived => format!(
                "{select} WHERE {} AND {search} ORDER BY m.sent_at DESC",
                Self::predicate_archived()
            ),
            // Inbox groups by conversation: the latest visible message per
            // conversation represents the thread.
            ListView::Inbox => format!(
                "SELECT * FROM (SELECT DISTINCT ON (m.conversation_id) {rest} \
                 WHERE m.conversation_id IS NOT NULL AND {pred} AND {search} \
                 ORDER BY m.conversation_id, m.sent_at DESC) t \
                 ORDER BY t.sent_at DESC",
                rest = select.strip_prefix("SELECT ").unwrap_or(&select),
                pred = Self::predicate_all(),
            ),
        };

        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(pattern)
            .fetch_all(db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| crate::routes::messages::MessageSummary {
                id: r.get("id"),
                conversation_id: r.get("conversation_id"),
                counterpart_id: r.get("counterpart_id"),
                counterpart_name: r.get("counterpart_name"),
                subject: r.get("subject"),
                body: r.get("body"),
                importance: Importance::from_db(r.get::<String, _>("importance").as_str()),
                sent_at: r.get("sent_at"),
                is_read: r.get("is_read"),
            })
            .collect())
    }

    /// Unread messages for the recipient. Archived state deliberately does
    /// not affect this count, even though the inbox view filters archived
    /// messages out.
    pub async fn unread_count(db: &Pool<Postgres>, user_id: Uuid) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages \
             WHERE recipient_id = $1 AND NOT is_read AND NOT deleted_by_recipient",
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    pub(crate) async fn fetch(db: &Pool<Postgres>, message_id: Uuid) -> Result<Message, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(message_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)?;
        Ok(message_from_row(&row))
    }

    pub async fn attachments_for(
        db: &Pool<Postgres>,
        message_id: Uuid,
    ) -> Result<Vec<Attachment>, AppError> {
        let rows = sqlx::query_as::<_, Attachment>(
            "SELECT id, message_id, storage_key, original_name, size_bytes, uploaded_by, uploaded_at \
             FROM message_attachments WHERE message_id = $1 ORDER BY uploaded_at ASC",
        )
        .bind(message_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    fn validate(
        input: &Composition,
        sender_id: Uuid,
        policy: &AttachmentPolicy,
    ) -> Result<(), AppError> {
        if input.recipient_id == sender_id {
            return Err(AppError::validation(
                "recipient",
                "cannot send a message to yourself",
            ));
        }
        if input.body.trim().is_empty() {
            return Err(AppError::validation("body", "message body is required"));
        }
        if let Some(subject) = &input.subject {
            if subject.chars().count() > MAX_SUBJECT_CHARS {
                return Err(AppError::validation(
                    "subject",
                    format!("subject exceeds {MAX_SUBJECT_CHARS} characters"),
                ));
            }
        }
        if input.attachments.len() > policy.max_per_message {
            return Err(AppError::validation(
                "attachments",
                format!("at most {} attachments per message", policy.max_per_message),
            ));
        }
        for upload in &input.attachments {
            if upload.file_name.trim().is_empty() {
                return Err(AppError::validation(
                    "attachments",
                    "attachment file name is required",
                ));
            }
            if upload.bytes.len() as i64 > policy.max_bytes {
                return Err(AppError::validation(
                    "attachments",
                    format!(
                        "attachment {:?} exceeds the {} byte limit",
                        upload.file_name, policy.max_bytes
                    ),
                ));
            }
        }
        Ok(())
    }

    fn predicate_all() -> &'static str {
        "((m.sender_id = $1 AND NOT m.deleted_by_sender AND NOT m.archived_by_sender) \
          OR (m.recipient_id = $1 AND NOT m.deleted_by_recipient AND NOT m.archived_by_recipient))"
    }

    fn predicate_sent() -> &'static str {
        "(m.sender_id = $1 AND NOT m.deleted_by_sender AND NOT m.archived_by_sender)"
    }

    fn predicate_archived() -> &'static str {
        "((m.sender_id = $1 AND m.archived_by_sender AND NOT m.deleted_by_sender) \
          OR (m.recipient_id = $1 AND m.archived_by_recipient AND NOT m.deleted_by_recipient))"
    }
}

/// Escape LIKE metacharacters so user queries are literal substring matches.
pub fn escape_like(q: &str) -> String {
    q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub(crate) fn message_from_row(row: &PgRow) -> Message {
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        recipient_id: row.get("recipient_id"),
        subject: row.get("subject"),
        body: row.get("body"),
        importance: Importance::from_db(row.get::<String, _>("importance").as_str()),
        sent_at: row.get("sent_at"),
        is_read: row.get("is_read"),
        archived_by_sender: row.get("archived_by_sender"),
        archived_by_recipient: row.get("archived_by_recipient"),
        deleted_by_sender: row.get("deleted_by_sender"),
        deleted_by_recipient: row.get("deleted_by_recipient"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_neutralizes_metacharacters() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn validation_rejects_self_messaging() {
        let user = Uuid::new_v4();
        let policy = AttachmentPolicy {
            max_bytes: 1024,
            max_per_message: 2,
        };
        let input = Composition {
            recipient_id: user,
            subject: None,
            body: "hi".into(),
            importance: Importance::Normal,
            attachments: vec![],
            conversation_id: None,
        };
        assert!(matches!(
            MessageService::validate(&input, user, &policy),
            Err(AppError::Validation { field: "recipient", .. })
        ));
    }

    #[test]
    fn validation_enforces_attachment_policy() {
        let policy = AttachmentPolicy {
            max_bytes: 4,
            max_per_message: 1,
        };
        let base = || Composition {
            recipient_id: Uuid::new_v4(),
            subject: None,
            body: "hi".into(),
            importance: Importance::Normal,
            attachments: vec![],
            conversation_id: None,
        };

        let mut too_big = base();
        too_big.attachments = vec![AttachmentUpload {
            file_name: "a.bin".into(),
            bytes: vec![0; 5],
        }];
        assert!(MessageService::validate(&too_big, Uuid::new_v4(), &policy).is_err());

        let mut too_many = base();
        too_many.attachments = vec![
            AttachmentUpload {
                file_name: "a".into(),
                bytes: vec![],
            },
            AttachmentUpload {
                file_name: "b".into(),
                bytes: vec![],
            },
        ];
        assert!(MessageService::validate(&too_many, Uuid::new_v4(), &policy).is_err());

        let mut empty_body = base();
        empty_body.body = "   ".into();
        assert!(matches!(
            MessageService::validate(&empty_body, Uuid::new_v4(), &policy),
            Err(AppError::Validation { field: "body", .. })
        ));
    }

    #[test]
    fn validation_caps_subject_length() {
        let policy = AttachmentPolicy {
            max_bytes: 1024,
            max_per_message: 2,
        };
        let input = |subject: String| Composition {
            recipient_id: Uuid::new_v4(),
            subject: Some(subject),
            body: "hi".into(),
            importance: Importance::Normal,
            attachments: vec![],
            conversation_id: None,
        };

        assert!(matches!(
            MessageService::validate(&input("s".repeat(501)), Uuid::new_v4(), &policy),
            Err(AppError::Validation { field: "subject", .. })
        ));
        // Exactly at the cap is allowed.
        assert!(MessageService::validate(&input("s".repeat(500)), Uuid::new_v4(), &policy).is_ok());
    }
}
