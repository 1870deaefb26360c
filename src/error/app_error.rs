use crate::service::token::TokenError;
use crate::storage::StorageError;
use rocket::http::{ContentType, Status};
use rocket::response::Responder;
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use std::io::Cursor;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error")]
    Db {
        message: String,
        #[source]
        source: sqlx::error::Error,
    },
    #[error("token has expired")]
    TokenExpired,
    #[error("invalid token")]
    TokenInvalid,
    #[error("invalid token type")]
    WrongTokenKind,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("Internal server error")]
    PasswordHash { message: String },
    #[error("email already taken")]
    EmailTaken,
    #[error("phone number already taken")]
    PhoneNumberTaken,
    #[error("attachment upload failed, please retry")]
    UploadFailed {
        #[source]
        source: StorageError,
    },
    #[error("failed to save attachment metadata, please retry")]
    MetadataWriteFailed {
        storage_key: String,
        #[source]
        source: Box<AppError>,
    },
    #[error("Internal server error")]
    Storage {
        #[source]
        source: StorageError,
    },
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("{message}")]
    UuidError {
        message: String,
        #[source]
        source: uuid::Error,
    },
    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationErrors),
    #[error("Internal server error")]
    ConfigurationError { message: String },
}

impl AppError {
    pub fn db(message: impl Into<String>, source: sqlx::error::Error) -> Self {
        Self::Db {
            message: message.into(),
            source,
        }
    }

    pub fn uuid(message: impl Into<String>, source: uuid::Error) -> Self {
        Self::UuidError {
            message: message.into(),
            source,
        }
    }

    pub fn password_hash(message: impl Into<String>, source: password_hash::Error) -> Self {
        Self::PasswordHash {
            message: format!("{}: {}", message.into(), source),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }
}

impl From<password_hash::Error> for AppError {
    fn from(e: password_hash::Error) -> Self {
        AppError::password_hash("Password hashing failed", e)
    }
}

impl From<uuid::Error> for AppError {
    fn from(e: uuid::Error) -> Self {
        AppError::uuid("Invalid UUID", e)
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AppError::TokenExpired,
            TokenError::Invalid => AppError::TokenInvalid,
            TokenError::WrongKind => AppError::WrongTokenKind,
            TokenError::Signing(message) => AppError::configuration(message),
            TokenError::MissingSecret => AppError::configuration("JWT secret must be configured"),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        AppError::Storage { source: e }
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::TokenExpired | AppError::TokenInvalid | AppError::WrongTokenKind => Status::Unauthorized,
            AppError::Unauthorized => Status::Unauthorized,
            AppError::InvalidCredentials | AppError::InvalidRefreshToken => Status::Unauthorized,
            AppError::Forbidden => Status::Forbidden,
            AppError::PasswordHash { .. } => Status::InternalServerError,
            AppError::Db { .. } => Status::InternalServerError,
            AppError::EmailTaken | AppError::PhoneNumberTaken => Status::Conflict,
            AppError::UploadFailed { .. } => Status::BadGateway,
            AppError::MetadataWriteFailed { .. } => Status::InternalServerError,
            AppError::Storage { .. } => Status::InternalServerError,
            AppError::BadRequest(_) => Status::BadRequest,
            AppError::NotFound(_) => Status::NotFound,
            AppError::UuidError { .. } => Status::BadRequest,
            AppError::ValidationError(_) => Status::BadRequest,
            AppError::ConfigurationError { .. } => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let method = req.method();
        let uri = req.uri();

        let request_id = req
            .local_cache(|| None::<crate::middleware::RequestId>)
            .as_ref()
            .map(|r| r.0.as_str())
            .unwrap_or("unknown");

        let user_id = req
            .local_cache(|| None::<crate::auth::CurrentUser>)
            .as_ref()
            .map(|u| u.id.to_string())
            .unwrap_or_else(|| "anonymous".to_string());

        error!(
            error = ?self,
            request_id = %request_id,
            user_id = %user_id,
            method = %method,
            uri = %uri,
            "request failed"
        );

        let status = Status::from(&self);
        let body = serde_json::json!({ "message": self.to_string() }).to_string();

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl OpenApiResponderInner for AppError {
    fn responses(_gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse};
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Bad Request"),
            ("401", "Unauthorized"),
            ("403", "Forbidden"),
            ("404", "Not Found"),
            ("409", "Conflict"),
            ("500", "Internal Server Error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::configuration(format!("Failed to read configuration: {}", e))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::db("Database error", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_map_to_unauthorized() {
        for err in [
            AppError::TokenExpired,
            AppError::TokenInvalid,
            AppError::WrongTokenKind,
            AppError::InvalidCredentials,
            AppError::InvalidRefreshToken,
        ] {
            assert_eq!(Status::from(&err), Status::Unauthorized, "{err:?}");
        }
        assert_eq!(Status::from(&AppError::Forbidden), Status::Forbidden);
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = AppError::db("insert attachment", sqlx::Error::PoolTimedOut);
        assert_eq!(err.to_string(), "Internal server error");

        let err = AppError::configuration("JWT secret missing");
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[test]
    fn metadata_failure_keeps_original_error_as_source() {
        let err = AppError::MetadataWriteFailed {
            storage_key: "attachments/n1/1_hello.txt".to_string(),
            source: Box::new(AppError::NotFound("note".to_string())),
        };

        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Not found: note"));
        assert_eq!(Status::from(&err), Status::InternalServerError);
    }

    #[test]
    fn conflicts_map_to_409() {
        assert_eq!(Status::from(&AppError::EmailTaken), Status::Conflict);
        assert_eq!(Status::from(&AppError::PhoneNumberTaken), Status::Conflict);
    }
}
