use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::AuthRateLimit;
use crate::models::user::{LoginRequest, LoginResponse, RefreshRequest, RegisterRequest, UserResponse};
use crate::service::auth::AuthService;
use crate::service::password::PasswordHasher;
use crate::service::token::{TokenPair, TokenService};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use validator::Validate;

/// Create an account with the `user` role
#[openapi(tag = "Auth")]
#[post("/register", data = "<payload>")]
pub async fn register(
    pool: &State<PgPool>,
    tokens: &State<TokenService>,
    passwords: &State<PasswordHasher>,
    _rate_limit: AuthRateLimit,
    payload: Json<RegisterRequest>,
) -> Result<(Status, Json<UserResponse>), AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = AuthService::new(&repo, tokens.inner(), passwords.inner());
    let user = service.register(&payload.email, &payload.username, &payload.password).await?;
    Ok((Status::Created, Json(UserResponse::from(&user))))
}

/// Exchange credentials for an access/refresh token pair
#[openapi(tag = "Auth")]
#[post("/login", data = "<payload>")]
pub async fn login(
    pool: &State<PgPool>,
    tokens: &State<TokenService>,
    passwords: &State<PasswordHasher>,
    _rate_limit: AuthRateLimit,
    payload: Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    // Shape errors would otherwise tell unknown emails apart from bad passwords.
    payload.validate().map_err(|_| AppError::InvalidCredentials)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = AuthService::new(&repo, tokens.inner(), passwords.inner());
    let (user, tokens) = service.login(&payload.email, &payload.password).await?;
    Ok(Json(LoginResponse {
        user: UserResponse::from(&user),
        tokens,
    }))
}

/// Trade a refresh token for a fresh token pair
#[openapi(tag = "Auth")]
#[post("/refresh", data = "<payload>")]
pub async fn refresh(
    pool: &State<PgPool>,
    tokens: &State<TokenService>,
    passwords: &State<PasswordHasher>,
    _rate_limit: AuthRateLimit,
    payload: Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    payload.validate().map_err(|_| AppError::InvalidRefreshToken)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = AuthService::new(&repo, tokens.inner(), passwords.inner());
    Ok(Json(service.refresh(&payload.refresh_token).await?))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![register, login, refresh]
}

#[cfg(test)]
mod tests {
    use crate::build_rocket;
    use crate::test_utils::test_config;
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{Value, json};

    async fn post(client: &Client, path: &str, body: Value) -> (Status, Value) {
        let response = client.post(path).header(ContentType::JSON).body(body.to_string()).dispatch().await;
        let status = response.status();
        let body = response.into_json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn register_login_refresh_flow() {
        let client = Client::tracked(build_rocket(test_config())).await.expect("valid rocket instance");
        let email = format!("{}@example.com", uuid::Uuid::new_v4());

        let (status, user) = post(&client, "/api/v1/auth/register", json!({"email": email, "username": "clinician", "password": "correct horse"})).await;
        assert_eq!(status, Status::Created);
        assert!(user.get("password_hash").is_none());

        let (status, _) = post(&client, "/api/v1/auth/register", json!({"email": email, "username": "again", "password": "correct horse"})).await;
        assert_eq!(status, Status::Conflict);

        let (status, login) = post(&client, "/api/v1/auth/login", json!({"email": email, "password": "correct horse"})).await;
        assert_eq!(status, Status::Ok);
        let refresh_token = login["tokens"]["refresh_token"].as_str().expect("refresh token").to_string();

        let (status, pair) = post(&client, "/api/v1/auth/refresh", json!({"refresh_token": refresh_token})).await;
        assert_eq!(status, Status::Ok);
        assert!(pair["access_token"].is_string());
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn login_failures_are_indistinguishable() {
        let client = Client::tracked(build_rocket(test_config())).await.expect("valid rocket instance");
        let email = format!("{}@example.com", uuid::Uuid::new_v4());
        post(&client, "/api/v1/auth/register", json!({"email": email, "username": "u", "password": "correct horse"})).await;

        let wrong_password = post(&client, "/api/v1/auth/login", json!({"email": email, "password": "wrong horse"})).await;
        let unknown_email = post(&client, "/api/v1/auth/login", json!({"email": "nobody@example.com", "password": "correct horse"})).await;

        assert_eq!(wrong_password.0, Status::Unauthorized);
        assert_eq!(wrong_password, unknown_email);
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn access_token_cannot_refresh() {
        let client = Client::tracked(build_rocket(test_config())).await.expect("valid rocket instance");
        let email = format!("{}@example.com", uuid::Uuid::new_v4());
        post(&client, "/api/v1/auth/register", json!({"email": email, "username": "u", "password": "correct horse"})).await;
        let (_, login) = post(&client, "/api/v1/auth/login", json!({"email": email, "password": "correct horse"})).await;

        let access = login["tokens"]["access_token"].as_str().expect("access token");
        let (status, _) = post(&client, "/api/v1/auth/refresh", json!({"refresh_token": access})).await;
        assert_eq!(status, Status::Unauthorized);
    }
}
