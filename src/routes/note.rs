use crate::Config;
use crate::auth::CurrentUser;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::attachment::AttachmentResponse;
use crate::models::note::{CreateNoteResponse, Note, NoteRequest, NoteResponse, NoteUpdateRequest};
use crate::models::pagination::{PaginatedResponse, PaginationParams};
use crate::routes::patient::load_managed_patient;
use crate::service::attachment::AttachmentService;
use crate::storage::ObjectStorage;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, delete, get, patch, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

fn parse_note_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|e| AppError::uuid("Invalid note id", e))
}

/// Loads a live note written by the caller (or any note for admins).
pub(crate) async fn load_managed_note(repo: &PostgresRepository, current_user: &CurrentUser, id: &Uuid) -> Result<Note, AppError> {
    let note = repo
        .get_note_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Note not found".to_string()))?;

    if !current_user.can_manage(&note.user_id) {
        return Err(AppError::Forbidden);
    }
    Ok(note)
}

pub(crate) fn attachment_service(pool: &PgPool, storage: &Arc<dyn ObjectStorage>, config: &Config) -> AttachmentService<PostgresRepository> {
    AttachmentService::new(
        Arc::new(PostgresRepository { pool: pool.clone() }),
        Arc::clone(storage),
        Duration::from_secs(config.storage.presigned_url_ttl_seconds),
    )
}

/// Create a note for a patient; its conversation is opened alongside
#[openapi(tag = "Notes")]
#[post("/", data = "<payload>")]
pub async fn create_note(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    payload: Json<NoteRequest>,
) -> Result<(Status, Json<CreateNoteResponse>), AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    load_managed_patient(&repo, &current_user, &payload.patient_id).await?;

    let (note, conversation) = repo.create_note_with_conversation(&payload.patient_id, &current_user.id, &payload.content).await?;
    info!(note_id = %note.id, conversation_id = %conversation.id, user_id = %current_user.id, "note created");

    Ok((
        Status::Created,
        Json(CreateNoteResponse {
            note_id: note.id,
            conversation_id: conversation.id,
        }),
    ))
}

/// List notes; admins see every author's notes
#[openapi(tag = "Notes")]
#[get("/?<page>&<page_size>")]
pub async fn list_notes(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    page: Option<i64>,
    page_size: Option<i64>,
) -> Result<Json<PaginatedResponse<NoteResponse>>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let params = PaginationParams::new(page, page_size);
    let author = (!current_user.is_admin()).then_some(&current_user.id);

    let (notes, total) = repo.list_notes(author, &params).await?;
    let data = notes.iter().map(NoteResponse::from).collect();
    Ok(Json(PaginatedResponse::new(data, &params, total)))
}

/// Get a note by id
#[openapi(tag = "Notes")]
#[get("/<id>")]
pub async fn get_note(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser, id: &str) -> Result<Json<NoteResponse>, AppError> {
    let note_id = parse_note_id(id)?;
    let repo = PostgresRepository { pool: pool.inner().clone() };

    let note = load_managed_note(&repo, &current_user, &note_id).await?;
    Ok(Json(NoteResponse::from(&note)))
}

/// List a patient's notes
#[openapi(tag = "Notes")]
#[get("/patient/<patient_id>?<page>&<page_size>")]
pub async fn list_notes_for_patient(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    patient_id: &str,
    page: Option<i64>,
    page_size: Option<i64>,
) -> Result<Json<PaginatedResponse<NoteResponse>>, AppError> {
    let patient_id = Uuid::parse_str(patient_id).map_err(|e| AppError::uuid("Invalid patient id", e))?;
    let repo = PostgresRepository { pool: pool.inner().clone() };
    load_managed_patient(&repo, &current_user, &patient_id).await?;

    let params = PaginationParams::new(page, page_size);
    let (notes, total) = repo.list_notes_for_patient(&patient_id, &params).await?;
    let data = notes.iter().map(NoteResponse::from).collect();
    Ok(Json(PaginatedResponse::new(data, &params, total)))
}

/// Replace a note's content
#[openapi(tag = "Notes")]
#[patch("/<id>", data = "<payload>")]
pub async fn update_note(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
    payload: Json<NoteUpdateRequest>,
) -> Result<Json<NoteResponse>, AppError> {
    let note_id = parse_note_id(id)?;
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    load_managed_note(&repo, &current_user, &note_id).await?;

    let note = repo.update_note(&note_id, &payload.content).await?;
    Ok(Json(NoteResponse::from(&note)))
}

/// Soft-delete a note
#[openapi(tag = "Notes")]
#[delete("/<id>")]
pub async fn delete_note(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser, id: &str) -> Result<Status, AppError> {
    let note_id = parse_note_id(id)?;
    let repo = PostgresRepository { pool: pool.inner().clone() };

    load_managed_note(&repo, &current_user, &note_id).await?;
    repo.soft_delete_note(&note_id).await?;
    info!(note_id = %note_id, user_id = %current_user.id, "note deleted");
    Ok(Status::NoContent)
}

/// List a note's attachments with freshly presigned download URLs
#[openapi(tag = "Notes")]
#[get("/<id>/attachments", rank = 2)]
pub async fn list_note_attachments(
    pool: &State<PgPool>,
    storage: &State<Arc<dyn ObjectStorage>>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
) -> Result<Json<Vec<AttachmentResponse>>, AppError> {
    let note_id = parse_note_id(id)?;
    let repo = PostgresRepository { pool: pool.inner().clone() };
    load_managed_note(&repo, &current_user, &note_id).await?;

    let service = attachment_service(pool.inner(), storage.inner(), config.inner());
    Ok(Json(service.list_for_note(&note_id).await?))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![
        create_note,
        list_notes,
        get_note,
        list_notes_for_patient,
        update_note,
        delete_note,
        list_note_attachments
    ]
}

#[cfg(test)]
mod tests {
    use crate::build_rocket;
    use crate::test_utils::{sign_up, test_config};
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{Value, json};

    async fn create_patient(client: &Client, auth: &Header<'static>) -> String {
        let patient: Value = client
            .post("/api/v1/patients")
            .header(ContentType::JSON)
            .header(auth.clone())
            .body(json!({"first_name": "Jane", "last_name": "Doe"}).to_string())
            .dispatch()
            .await
            .into_json()
            .await
            .expect("patient json");
        patient["id"].as_str().expect("patient id").to_string()
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn creating_a_note_opens_a_conversation() {
        let client = Client::tracked(build_rocket(test_config())).await.expect("valid rocket instance");
        let (_, auth) = sign_up(&client).await;
        let patient_id = create_patient(&client, &auth).await;

        let response = client
            .post("/api/v1/notes")
            .header(ContentType::JSON)
            .header(auth.clone())
            .body(json!({"patient_id": patient_id, "content": "Presented with a cough."}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let created: Value = response.into_json().await.expect("note json");
        assert!(created["conversation_id"].is_string());

        let listed: Value = client
            .get(format!("/api/v1/notes/patient/{}", patient_id))
            .header(auth)
            .dispatch()
            .await
            .into_json()
            .await
            .expect("page json");
        assert_eq!(listed["total_items"], 1);
        assert_eq!(listed["data"][0]["id"], created["note_id"]);
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn deleted_notes_are_gone() {
        let client = Client::tracked(build_rocket(test_config())).await.expect("valid rocket instance");
        let (_, auth) = sign_up(&client).await;
        let patient_id = create_patient(&client, &auth).await;

        let created: Value = client
            .post("/api/v1/notes")
            .header(ContentType::JSON)
            .header(auth.clone())
            .body(json!({"patient_id": patient_id, "content": ""}).to_string())
            .dispatch()
            .await
            .into_json()
            .await
            .expect("note json");
        let url = format!("/api/v1/notes/{}", created["note_id"].as_str().expect("note id"));

        assert_eq!(client.delete(url.clone()).header(auth.clone()).dispatch().await.status(), Status::NoContent);
        assert_eq!(client.get(url).header(auth).dispatch().await.status(), Status::NotFound);
    }
}
