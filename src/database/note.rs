use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::conversation::Conversation;
use crate::models::note::Note;
use crate::models::pagination::PaginationParams;
use uuid::Uuid;

const NOTE_COLUMNS: &str = "id, patient_id, user_id, content, created_at, updated_at";

impl PostgresRepository {
    /// Inserts the note and its conversation in one transaction.
    pub async fn create_note_with_conversation(&self, patient_id: &Uuid, user_id: &Uuid, content: &str) -> Result<(Note, Conversation), AppError> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            INSERT INTO notes (patient_id, user_id, content)
            VALUES ($1, $2, $3)
            RETURNING {NOTE_COLUMNS}
            "#
        );
        let note = sqlx::query_as::<_, Note>(&query)
            .bind(patient_id)
            .bind(user_id)
            .bind(content)
            .fetch_one(&mut *tx)
            .await?;

        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (note_id)
            VALUES ($1)
            RETURNING id, note_id, created_at, updated_at
            "#,
        )
        .bind(note.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((note, conversation))
    }

    pub async fn get_note_by_id(&self, id: &Uuid) -> Result<Option<Note>, AppError> {
        let query = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1 AND deleted_at IS NULL");
        let note = sqlx::query_as::<_, Note>(&query).bind(id).fetch_optional(&self.pool).await?;

        Ok(note)
    }

    /// `user_id = None` lists notes of every author.
    pub async fn list_notes(&self, user_id: Option<&Uuid>, pagination: &PaginationParams) -> Result<(Vec<Note>, i64), AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE deleted_at IS NULL AND ($1::uuid IS NULL OR user_id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let query = format!(
            r#"
            SELECT {NOTE_COLUMNS}
            FROM notes
            WHERE deleted_at IS NULL AND ($1::uuid IS NULL OR user_id = $1)
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#
        );
        let notes = sqlx::query_as::<_, Note>(&query)
            .bind(user_id)
            .bind(pagination.effective_page_size())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((notes, total))
    }

    pub async fn list_notes_for_patient(&self, patient_id: &Uuid, pagination: &PaginationParams) -> Result<(Vec<Note>, i64), AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE deleted_at IS NULL AND patient_id = $1")
            .bind(patient_id)
            .fetch_one(&self.pool)
            .await?;

        let query = format!(
            r#"
            SELECT {NOTE_COLUMNS}
            FROM notes
            WHERE deleted_at IS NULL AND patient_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#
        );
        let notes = sqlx::query_as::<_, Note>(&query)
            .bind(patient_id)
            .bind(pagination.effective_page_size())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((notes, total))
    }

    pub async fn update_note(&self, id: &Uuid, content: &str) -> Result<Note, AppError> {
        let query = format!(
            r#"
            UPDATE notes
            SET content = $1, updated_at = now()
            WHERE id = $2 AND deleted_at IS NULL
            RETURNING {NOTE_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Note>(&query)
            .bind(content)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Note not found".to_string()))
    }

    pub async fn soft_delete_note(&self, id: &Uuid) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE notes SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Note not found".to_string()));
        }
        Ok(())
    }
}
