use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::attachment::{Attachment, NewAttachment};
use uuid::Uuid;

#[async_trait::async_trait]
pub trait AttachmentRepository: Send + Sync {
    async fn create_attachment(&self, attachment: &NewAttachment) -> Result<Attachment, AppError>;
    async fn list_attachments_for_note(&self, note_id: &Uuid) -> Result<Vec<Attachment>, AppError>;
}

#[async_trait::async_trait]
impl AttachmentRepository for PostgresRepository {
    async fn create_attachment(&self, attachment: &NewAttachment) -> Result<Attachment, AppError> {
        let created = sqlx::query_as::<_, Attachment>(
            r#"
            INSERT INTO attachments (note_id, message_id, url, name, mime_type, size_bytes, storage_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, note_id, message_id, url, name, mime_type, size_bytes, storage_key, created_at
            "#,
        )
        .bind(attachment.note_id)
        .bind(attachment.message_id)
        .bind(&attachment.url)
        .bind(&attachment.name)
        .bind(&attachment.mime_type)
        .bind(attachment.size_bytes)
        .bind(&attachment.storage_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn list_attachments_for_note(&self, note_id: &Uuid) -> Result<Vec<Attachment>, AppError> {
        let attachments = sqlx::query_as::<_, Attachment>(
            r#"
            SELECT id, note_id, message_id, url, name, mime_type, size_bytes, storage_key, created_at
            FROM attachments
            WHERE note_id = $1 AND deleted_at IS NULL
            ORDER BY created_at
            "#,
        )
        .bind(note_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attachments)
    }
}
