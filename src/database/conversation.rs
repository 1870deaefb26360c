use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::conversation::Conversation;
use uuid::Uuid;

impl PostgresRepository {
    pub async fn get_conversation_by_note_id(&self, note_id: &Uuid) -> Result<Option<Conversation>, AppError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT c.id, c.note_id, c.created_at, c.updated_at
            FROM conversations c
            JOIN notes n ON n.id = c.note_id
            WHERE c.note_id = $1 AND n.deleted_at IS NULL
            ORDER BY c.created_at
            LIMIT 1
            "#,
        )
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    pub async fn get_conversation_by_id(&self, id: &Uuid) -> Result<Option<Conversation>, AppError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT c.id, c.note_id, c.created_at, c.updated_at
            FROM conversations c
            JOIN notes n ON n.id = c.note_id
            WHERE c.id = $1 AND n.deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }
}
