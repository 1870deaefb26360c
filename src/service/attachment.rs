use crate::database::attachment::AttachmentRepository;
use crate::error::app_error::AppError;
use crate::models::attachment::{
    Attachment, AttachmentResponse, AttachmentUpload, DEFAULT_CONTENT_TYPE, FALLBACK_FILE_NAME, MAX_CONTENT_TYPE_LEN, MAX_FILE_NAME_LEN, NewAttachment,
};
use crate::storage::{ObjectStorage, StorageError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Strips any directory part and replaces characters outside
/// `[A-Za-z0-9._-]`, so client names can never escape the key prefix.
/// Names longer than [`MAX_FILE_NAME_LEN`] are shortened, keeping a short
/// extension.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let cleaned = truncate_file_name(cleaned);

    if cleaned.chars().all(|c| c == '.') {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned
    }
}

// Input is ASCII, so byte offsets are char boundaries.
fn truncate_file_name(mut name: String) -> String {
    if name.len() <= MAX_FILE_NAME_LEN {
        return name;
    }

    match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= 16 => {
            let extension = name.split_off(dot);
            name.truncate(MAX_FILE_NAME_LEN - extension.len());
            name.push_str(&extension);
            name
        }
        _ => {
            name.truncate(MAX_FILE_NAME_LEN);
            name
        }
    }
}

/// Name shown to clients; only a blank name is replaced.
pub fn display_name(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Falls back to [`DEFAULT_CONTENT_TYPE`] when absent and rejects values
/// that would not fit the metadata record.
pub fn normalize_content_type(raw: Option<&str>) -> Result<String, AppError> {
    let content_type = raw.map(str::trim).filter(|ct| !ct.is_empty()).unwrap_or(DEFAULT_CONTENT_TYPE);
    if content_type.len() > MAX_CONTENT_TYPE_LEN {
        return Err(AppError::BadRequest("Attachment content type is too long".to_string()));
    }
    Ok(content_type.to_string())
}

pub fn storage_key(note_id: &Uuid, file_name: &str, now: DateTime<Utc>, nonce: &str) -> String {
    format!(
        "attachments/{}/{}-{}_{}",
        note_id,
        now.timestamp_millis(),
        nonce,
        sanitize_file_name(file_name)
    )
}

fn key_nonce() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Stores the blob first, then its metadata record. A failed record write
/// deletes the blob again; a failed delete is logged as an orphan.
pub struct AttachmentService<R: AttachmentRepository + 'static> {
    repo: Arc<R>,
    storage: Arc<dyn ObjectStorage>,
    presign_ttl: Duration,
}

impl<R: AttachmentRepository + 'static> Clone for AttachmentService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            storage: Arc::clone(&self.storage),
            presign_ttl: self.presign_ttl,
        }
    }
}

impl<R: AttachmentRepository + 'static> AttachmentService<R> {
    pub fn new(repo: Arc<R>, storage: Arc<dyn ObjectStorage>, presign_ttl: Duration) -> Self {
        AttachmentService { repo, storage, presign_ttl }
    }

    /// Returns the stored record and a presigned GET URL, which is empty when
    /// presigning failed.
    pub async fn create(&self, upload: AttachmentUpload) -> Result<(Attachment, String), AppError> {
        let content_type = normalize_content_type(upload.content_type.as_deref())?;
        let key = storage_key(&upload.note_id, &upload.file_name, Utc::now(), &key_nonce());
        let size_bytes = upload.bytes.len() as i64;

        info!(
            key = %key,
            note_id = %upload.note_id,
            content_type = %content_type,
            size = size_bytes,
            "uploading attachment"
        );

        let url = self
            .storage
            .put(&key, upload.bytes, &content_type)
            .await
            .map_err(|source| AppError::UploadFailed { source })?;

        let record = NewAttachment {
            note_id: upload.note_id,
            message_id: upload.message_id,
            url,
            name: display_name(&upload.file_name),
            mime_type: content_type,
            size_bytes,
            storage_key: key.clone(),
        };

        let attachment = match self.repo.create_attachment(&record).await {
            Ok(attachment) => attachment,
            Err(err) => {
                error!(key = %key, error = %err, "attachment metadata write failed, deleting uploaded object");
                if let Err(delete_err) = self.storage.delete(&key).await {
                    error!(key = %key, error = %delete_err, "orphaned object");
                }
                return Err(AppError::MetadataWriteFailed {
                    storage_key: key,
                    source: Box::new(err),
                });
            }
        };

        info!(
            attachment_id = %attachment.id,
            key = %attachment.storage_key,
            size = attachment.size_bytes,
            "attachment uploaded and recorded"
        );

        let presigned_url = self.presign(&attachment.storage_key).await;
        Ok((attachment, presigned_url))
    }

    /// Runs [`Self::create`] on its own task so the saga, including any
    /// compensation, completes even if the request future is dropped.
    pub async fn run_detached(&self, upload: AttachmentUpload) -> Result<(Attachment, String), AppError> {
        let service = self.clone();
        tokio::spawn(async move { service.create(upload).await })
            .await
            .map_err(|e| AppError::from(StorageError::Unavailable(format!("attachment task failed: {}", e))))?
    }

    pub async fn list_for_note(&self, note_id: &Uuid) -> Result<Vec<AttachmentResponse>, AppError> {
        let attachments = self.repo.list_attachments_for_note(note_id).await?;

        let mut responses = Vec::with_capacity(attachments.len());
        for attachment in &attachments {
            let url = self.presign(&attachment.storage_key).await;
            responses.push(AttachmentResponse::new(attachment, url));
        }
        Ok(responses)
    }

    async fn presign(&self, key: &str) -> String {
        match self.storage.presign(key, self.presign_ttl).await {
            Ok(url) => url,
            Err(e) => {
                warn!(key = %key, error = %e, "presigning attachment failed");
                String::new()
            }
        }
    }
}
