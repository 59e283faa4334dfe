use sqlx::{Executor, Pool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::conversation::{pair_key, Conversation};

pub struct ConversationService;

impl ConversationService {
    /// Resolve the unique two-party conversation for {a, b}, creating it if
    /// absent. Safe under concurrent calls for the same pair: the insert is
    /// `ON CONFLICT (pair_key) DO NOTHING` followed by a re-select, so both
    /// racers converge on one row.
    pub async fn get_or_create_direct(
        db: &Pool<Postgres>,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<Conversation, AppError> {
        let mut tx = db.begin().await?;
        let conversation = Self::get_or_create_direct_tx(&mut tx, user_a, user_b).await?;
        tx.commit().await?;
        Ok(conversation)
    }

    /// Transaction-scoped variant used by message composition so conversation
    /// creation and the first message commit atomically.
    pub async fn get_or_create_direct_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<Conversation, AppError> {
        if user_a == user_b {
            return Err(AppError::validation(
                "recipient",
                "a conversation requires two distinct participants",
            ));
        }

        let key = pair_key(user_a, user_b);

        if let Some(existing) = Self::find_by_pair_key(&mut **tx, &key).await? {
            return Ok(existing);
        }

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO conversations (id, pair_key) VALUES ($1, $2) \
             ON CONFLICT (pair_key) DO NOTHING",
        )
        .bind(id)
        .bind(&key)
        .execute(&mut **tx)
        .await?;

        // Re-select: either our insert landed or a concurrent composer won.
        let conversation = Self::find_by_pair_key(&mut **tx, &key)
            .await?
            .ok_or(AppError::Internal)?;

        if conversation.id == id {
            sqlx::query(
                "INSERT INTO conversation_participants (conversation_id, user_id) \
                 VALUES ($1, $2), ($1, $3) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(user_a)
            .bind(user_b)
            .execute(&mut **tx)
            .await?;
        }

        Ok(conversation)
    }

    async fn find_by_pair_key<'e, E>(db: E, key: &str) -> Result<Option<Conversation>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, Conversation>(
            "SELECT id, project_id, pair_key, created_at, updated_at \
             FROM conversations WHERE pair_key = $1",
        )
        .bind(key)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn is_participant<'e, E>(
        db: E,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_scalar::<_, i32>(
            "SELECT 1 FROM conversation_participants \
             WHERE conversation_id = $1 AND user_id = $2 LIMIT 1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row.is_some())
    }

    /// Refresh `updated_at`; called whenever a contained message is created.
    pub async fn touch(
        tx: &mut Transaction<'_, Postgres>,
        conversation_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
