use chrono::{DateTime, Utc};
use rocket::serde::Serialize;
use schemars::JsonSchema;
use uuid::Uuid;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
/// Stand-in when the client sends no usable file name.
pub const FALLBACK_FILE_NAME: &str = "file";
/// Longest sanitized file name kept in a storage key.
pub const MAX_FILE_NAME_LEN: usize = 128;
/// Matches `attachments.mime_type`.
pub const MAX_CONTENT_TYPE_LEN: usize = 100;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub note_id: Uuid,
    pub message_id: Option<Uuid>,
    pub url: String,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub note_id: Uuid,
    pub message_id: Option<Uuid>,
    pub url: String,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
}

/// An uploaded file as received from the client, before it reaches storage.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub note_id: Uuid,
    pub message_id: Option<Uuid>,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: bytes::Bytes,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub note_id: Uuid,
    pub message_id: Option<Uuid>,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub presigned_url: String,
}

impl AttachmentResponse {
    pub fn new(attachment: &Attachment, presigned_url: String) -> Self {
        Self {
            id: attachment.id,
            note_id: attachment.note_id,
            message_id: attachment.message_id,
            name: attachment.name.clone(),
            mime_type: attachment.mime_type.clone(),
            size_bytes: attachment.size_bytes,
            created_at: attachment.created_at,
            presigned_url,
        }
    }
}
