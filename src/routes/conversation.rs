use crate::Config;
use crate::auth::CurrentUser;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::attachment::AttachmentUpload;
use crate::models::message::{MOCK_ASSISTANT_REPLY, MessageResponse, MessageRole, SendMessageResponse};
use crate::routes::note::{attachment_service, load_managed_note};
use crate::service::attachment::normalize_content_type;
use crate::storage::ObjectStorage;
use rocket::form::{Form, FromForm};
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(FromForm)]
pub struct SendMessageForm<'r> {
    #[field(name = "noteID")]
    pub note_id: String,
    pub message: String,
    pub attachment: Option<TempFile<'r>>,
}

async fn read_upload(file: &TempFile<'_>) -> Result<bytes::Bytes, AppError> {
    let mut buffer = Vec::with_capacity(file.len() as usize);
    let reader = file.open().await.map_err(|e| {
        warn!(error = %e, "could not open uploaded attachment");
        AppError::BadRequest("Could not read attachment".to_string())
    })?;
    tokio::pin!(reader);
    reader.read_to_end(&mut buffer).await.map_err(|e| {
        warn!(error = %e, "could not read uploaded attachment");
        AppError::BadRequest("Could not read attachment".to_string())
    })?;
    Ok(buffer.into())
}

fn upload_file_name(file: &TempFile<'_>) -> String {
    file.raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string())
        .unwrap_or_default()
}

/// Post a message to a note's conversation, optionally with one attachment.
/// The reply is a placeholder assistant message.
#[openapi(skip)]
#[post("/send-message", data = "<form>")]
pub async fn send_message(
    pool: &State<PgPool>,
    storage: &State<Arc<dyn ObjectStorage>>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    form: Form<SendMessageForm<'_>>,
) -> Result<Json<SendMessageResponse>, AppError> {
    let note_id = Uuid::parse_str(form.note_id.trim()).map_err(|e| AppError::uuid("Invalid note id", e))?;
    if form.message.trim().is_empty() && form.attachment.is_none() {
        return Err(AppError::BadRequest("message or attachment required".to_string()));
    }

    let content_type = form
        .attachment
        .as_ref()
        .map(|file| normalize_content_type(file.content_type().map(|ct| ct.to_string()).as_deref()))
        .transpose()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    load_managed_note(&repo, &current_user, &note_id).await?;
    let conversation = repo
        .get_conversation_by_note_id(&note_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

    let message = repo.create_message(&conversation.id, MessageRole::User, &form.message).await?;

    let mut presigned_url = String::new();
    // An empty part is still an attachment.
    if let Some(file) = form.attachment.as_ref() {
        let upload = AttachmentUpload {
            note_id,
            message_id: Some(message.id),
            file_name: upload_file_name(file),
            content_type,
            bytes: read_upload(file).await?,
        };

        let service = attachment_service(pool.inner(), storage.inner(), config.inner());
        let (attachment, url) = service.run_detached(upload).await?;
        info!(attachment_id = %attachment.id, message_id = %message.id, "attachment stored for message");
        presigned_url = url;
    }

    let reply = repo.create_message(&conversation.id, MessageRole::Assistant, MOCK_ASSISTANT_REPLY).await?;
    info!(conversation_id = %conversation.id, user_id = %current_user.id, "message exchanged");

    Ok(Json(SendMessageResponse {
        message: reply.content,
        presigned_url,
    }))
}

/// List the messages in a conversation, oldest first
#[openapi(tag = "Conversations")]
#[get("/<id>/messages")]
pub async fn list_messages(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    let conversation_id = Uuid::parse_str(id).map_err(|e| AppError::uuid("Invalid conversation id", e))?;
    let repo = PostgresRepository { pool: pool.inner().clone() };

    let conversation = repo
        .get_conversation_by_id(&conversation_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;
    load_managed_note(&repo, &current_user, &conversation.note_id).await?;

    let messages = repo.list_messages(&conversation.id).await?;
    Ok(Json(messages.iter().map(MessageResponse::from).collect()))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![send_message, list_messages]
}
