use crate::auth::{AdminOnly, Authorized, CurrentUser};
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::pagination::{PaginatedResponse, PaginationParams};
use crate::models::user::{UserResponse, UserUpdateRequest};
use crate::service::auth::AuthService;
use crate::service::password::PasswordHasher;
use crate::service::token::TokenService;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, delete, get, patch};
use rocket_okapi::openapi;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

fn parse_user_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|e| AppError::uuid("Invalid user id", e))
}

/// Get the authenticated user
#[openapi(tag = "Users")]
#[get("/me")]
pub async fn get_me(
    pool: &State<PgPool>,
    tokens: &State<TokenService>,
    passwords: &State<PasswordHasher>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
) -> Result<Json<UserResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = AuthService::new(&repo, tokens.inner(), passwords.inner());
    let user = service.get_user(&current_user.id).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// List users (admin only)
#[openapi(tag = "Users")]
#[get("/?<page>&<page_size>")]
pub async fn list_users(
    pool: &State<PgPool>,
    tokens: &State<TokenService>,
    passwords: &State<PasswordHasher>,
    _rate_limit: RateLimit,
    _admin: Authorized<AdminOnly>,
    page: Option<i64>,
    page_size: Option<i64>,
) -> Result<Json<PaginatedResponse<UserResponse>>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = AuthService::new(&repo, tokens.inner(), passwords.inner());
    let params = PaginationParams::new(page, page_size);

    let (users, total) = service.list_users(&params).await?;
    let data = users.iter().map(UserResponse::from).collect();
    Ok(Json(PaginatedResponse::new(data, &params, total)))
}

/// Update a user's username or email (self or admin)
#[openapi(tag = "Users")]
#[patch("/<id>", data = "<payload>")]
pub async fn update_user(
    pool: &State<PgPool>,
    tokens: &State<TokenService>,
    passwords: &State<PasswordHasher>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
    payload: Json<UserUpdateRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user_id = parse_user_id(id)?;
    if !current_user.can_manage(&user_id) {
        return Err(AppError::Forbidden);
    }
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = AuthService::new(&repo, tokens.inner(), passwords.inner());
    let user = service.update(&user_id, &payload).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// Soft-delete a user (self or admin)
#[openapi(tag = "Users")]
#[delete("/<id>")]
pub async fn delete_user(
    pool: &State<PgPool>,
    tokens: &State<TokenService>,
    passwords: &State<PasswordHasher>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    id: &str,
) -> Result<Status, AppError> {
    let user_id = parse_user_id(id)?;
    if !current_user.can_manage(&user_id) {
        return Err(AppError::Forbidden);
    }

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = AuthService::new(&repo, tokens.inner(), passwords.inner());
    service.soft_delete(&user_id).await?;
    Ok(Status::NoContent)
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![get_me, list_users, update_user, delete_user]
}
