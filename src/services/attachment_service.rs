use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::attachment::Attachment;
use crate::services::message_service::MessageService;
use crate::storage::FileStore;

pub struct AttachmentService;

impl AttachmentService {
    /// Fetch attachment bytes for download. The caller must be a party to
    /// the owning message and must not have deleted it on their side; any
    /// failure of those checks reads as nonexistent.
    pub async fn download(
        db: &Pool<Postgres>,
        storage: &dyn FileStore,
        user_id: Uuid,
        attachment_id: Uuid,
    ) -> Result<(Attachment, Vec<u8>), AppError> {
        let attachment = Self::fetch(db, attachment_id).await?;
        let message = MessageService::fetch(db, attachment.message_id).await?;
        if !message.visible_to(user_id) {
            return Err(AppError::NotFound);
        }

        match storage.get(&attachment.storage_key).await {
            Ok(bytes) => Ok((attachment, bytes)),
            Err(e) => {
                // The row exists but the file does not (or cannot be read).
                // Log the real cause; the client sees 404.
                tracing::warn!(
                    attachment_id = %attachment_id,
                    storage_key = %attachment.storage_key,
                    error = %e,
                    "attachment file unreadable"
                );
                Err(e)
            }
        }
    }

    /// Remove a single attachment without touching the message. Only the
    /// uploader may do this.
    pub async fn remove(
        db: &Pool<Postgres>,
        storage: &dyn FileStore,
        user_id: Uuid,
        attachment_id: Uuid,
    ) -> Result<(), AppError> {
        let attachment = Self::fetch(db, attachment_id).await?;
        let message = MessageService::fetch(db, attachment.message_id).await?;
        if !message.visible_to(user_id) {
            return Err(AppError::NotFound);
        }
        if attachment.uploaded_by != Some(user_id) {
            return Err(AppError::Forbidden);
        }

        sqlx::query("DELETE FROM message_attachments WHERE id = $1")
            .bind(attachment_id)
            .execute(db)
            .await?;

        if let Err(e) = storage.remove(&attachment.storage_key).await {
            tracing::warn!(
                storage_key = %attachment.storage_key,
                error = %e,
                "failed to remove attachment file"
            );
        }
        Ok(())
    }

    async fn fetch(db: &Pool<Postgres>, attachment_id: Uuid) -> Result<Attachment, AppError> {
        sqlx::query_as::<_, Attachment>(
            "SELECT id, message_id, storage_key, original_name, size_bytes, uploaded_by, uploaded_at \
             FROM message_attachments WHERE id = $1",
        )
        .bind(attachment_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)
    }
}
