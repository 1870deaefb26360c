use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Note {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct NoteRequest {
    pub patient_id: Uuid,
    #[validate(length(max = 100_000))]
    pub content: String,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct NoteUpdateRequest {
    #[validate(length(max = 100_000))]
    pub content: String,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct NoteResponse {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creating a note also opens its conversation.
#[derive(Serialize, Debug, JsonSchema)]
pub struct CreateNoteResponse {
    pub note_id: Uuid,
    pub conversation_id: Uuid,
}

impl From<&Note> for NoteResponse {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id,
            patient_id: note.patient_id,
            user_id: note.user_id,
            content: note.content.clone(),
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}
