use crate::auth::CurrentUser;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::pagination::{PaginatedResponse, PaginationParams};
use crate::models::patient::{Patient, PatientRequest, PatientResponse, PatientUpdateRequest};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, delete, get, patch, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

fn parse_patient_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|e| AppError::uuid("Invalid patient id", e))
}

/// Loads a live patient the caller owns (or any patient for admins).
pub(crate) async fn load_managed_patient(repo: &PostgresRepository, current_user: &CurrentUser, id: &Uuid) -> Result<Patient, AppError> {
    let patient = repo
        .get_patient_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Patient not found".to_string()))?;

    if !current_user.can_manage(&patient.user_id) {
        return Err(AppError::Forbidden);
    }
    Ok(patient)
}

/// Rejects contact details already used by a different live patient.
async fn ensure_contact_free(repo: &PostgresRepository, email: Option<&str>, phone_number: Option<&str>, exclude: Option<&Uuid>) -> Result<(), AppError> {
    if let Some(email) = email
        && let Some(existing) = repo.find_patient_by_email(email).await?
        && Some(&existing.id) != exclude
    {
        return Err(AppError::EmailTaken);
    }

    if let Some(phone_number) = phone_number
        && let Some(existing) = repo.find_patient_by_phone(phone_number).await?
        && Some(&existing.id) != exclude
    {
        return Err(AppError::PhoneNumberTaken);
    }

    Ok(())
}

/// Create a patient owned by the caller
#[openapi(tag = "Patients")]
#[post("/", data = "<payload>")]
pub async fn create_patient(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    payload: Json<PatientRequest>,
) -> Result<(Status, Json<PatientResponse>), AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    ensure_contact_free(&repo, payload.email.as_deref(), payload.phone_number.as_deref(), None).await?;

    let patient = repo.create_patient(&payload, &current_user.id).await?;
    info!(patient_id = %patient.id, user_id = %current_user.id, "patient created");
    Ok((Status::Created, Json(PatientResponse::from(&patient))))
}

/// List patients; admins see every owner's patients
#[openapi(tag = "Patients")]
#[get("/?<page>&<page_size>")]
pub async fn list_patients(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    page: Option<i64>,
    page_size: Option<i64>,
) -> Result<Json<PaginatedResponse<PatientResponse>>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let params = PaginationParams::new(page, page_size);
    let owner = (!current_user.is_admin()).then_some(&current_user.id);

    let (patients, total) = repo.list_patients(owner, &params).await?;
    let data = patients.iter().map(PatientResponse::from).collect();
    Ok(Json(PaginatedResponse::new(data, &params, total)))
}

/// Get a patient by id
#[openapi(tag = "Patients")]
#[get("/<id>")]
pub async fn get_patient(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser, id: &str) -> Result<Json<PatientResponse>, AppError> {
    let patient_id = parse_patient_id(id)?;
    let repo = PostgresRepository { pool: pool.inner().clone() };

    let patient = load_managed_patient(&repo, &current_user, &patient_id).await?;
    Ok(Json(PatientResponse::from(&patient)))
}

/// Update a patient's details
#[openapi(tag = "Patients")]
#[patch("/<id>", data = "<payload>")]
pub async fn update_patient(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
    payload: Json<PatientUpdateRequest>,
) -> Result<Json<PatientResponse>, AppError> {
    let patient_id = parse_patient_id(id)?;
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    load_managed_patient(&repo, &current_user, &patient_id).await?;
    ensure_contact_free(&repo, payload.email.as_deref(), payload.phone_number.as_deref(), Some(&patient_id)).await?;

    let patient = repo.update_patient(&patient_id, &payload).await?;
    Ok(Json(PatientResponse::from(&patient)))
}

/// Soft-delete a patient
#[openapi(tag = "Patients")]
#[delete("/<id>")]
pub async fn delete_patient(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser, id: &str) -> Result<Status, AppError> {
    let patient_id = parse_patient_id(id)?;
    let repo = PostgresRepository { pool: pool.inner().clone() };

    load_managed_patient(&repo, &current_user, &patient_id).await?;
    repo.soft_delete_patient(&patient_id).await?;
    info!(patient_id = %patient_id, user_id = %current_user.id, "patient deleted");
    Ok(Status::NoContent)
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![create_patient, list_patients, get_patient, update_patient, delete_patient]
}
