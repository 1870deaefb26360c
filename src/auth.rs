use crate::models::user::Role;
use crate::service::token::{TokenError, TokenKind, TokenService};
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{Object, RefOr, Response, Responses, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use serde::Serialize;
use std::marker::PhantomData;
use std::ops::Deref;
use tracing::warn;
use uuid::Uuid;

/// Identity of the caller, taken from a verified access token.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Same subject or an admin.
    pub fn can_manage(&self, owner_id: &Uuid) -> bool {
        self.id == *owner_id || self.is_admin()
    }
}

/// Why a request was turned away by the session guards. Cached on the
/// request so the 401/403 catchers can render it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    MissingHeader,
    MalformedHeader,
    Expired,
    Invalid,
    WrongKind,
    Forbidden,
    Unavailable,
}

impl AuthRejection {
    pub fn message(&self) -> &'static str {
        match self {
            AuthRejection::MissingHeader => "authorization header required",
            AuthRejection::MalformedHeader => "invalid authorization header format",
            AuthRejection::Expired => "token has expired",
            AuthRejection::Invalid => "invalid token",
            AuthRejection::WrongKind => "invalid token type",
            AuthRejection::Forbidden => "insufficient permissions",
            AuthRejection::Unavailable => "Internal server error",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            AuthRejection::Forbidden => Status::Forbidden,
            AuthRejection::Unavailable => Status::InternalServerError,
            _ => Status::Unauthorized,
        }
    }
}

impl From<TokenError> for AuthRejection {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AuthRejection::Expired,
            TokenError::WrongKind => AuthRejection::WrongKind,
            TokenError::Invalid => AuthRejection::Invalid,
            TokenError::Signing(_) | TokenError::MissingSecret => AuthRejection::Unavailable,
        }
    }
}

/// Extracts the token from `Bearer <token>`; the scheme is case-insensitive.
pub(crate) fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}

fn authenticate(req: &Request<'_>) -> Result<CurrentUser, AuthRejection> {
    let tokens = req.rocket().state::<TokenService>().ok_or(AuthRejection::Unavailable)?;
    let header = req.headers().get_one("Authorization").ok_or(AuthRejection::MissingHeader)?;
    let token = bearer_token(header).ok_or(AuthRejection::MalformedHeader)?;
    let claims = tokens.verify_kind(token, TokenKind::Access)?;

    Ok(CurrentUser {
        id: claims.sub,
        role: claims.role,
    })
}

fn reject<T>(req: &Request<'_>, rejection: AuthRejection) -> RequestOutcome<T, AuthRejection> {
    req.local_cache(|| Some(rejection));
    warn!(
        method = %req.method(),
        uri = %req.uri(),
        reason = rejection.message(),
        "request rejected by session guard"
    );
    Outcome::Error((rejection.status(), rejection))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = AuthRejection;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        match authenticate(req) {
            Ok(current_user) => {
                req.local_cache(|| Some(current_user.clone()));
                Outcome::Success(current_user)
            }
            Err(rejection) => reject(req, rejection),
        }
    }
}

/// A fixed allow-list of roles for a route.
pub trait RolePolicy: 'static {
    const ALLOWED: &'static [Role];
}

pub struct AdminOnly;

impl RolePolicy for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

/// An authenticated caller whose role passed `P`. Identity is resolved first
/// through [`CurrentUser`].
pub struct Authorized<P: RolePolicy> {
    pub user: CurrentUser,
    _policy: PhantomData<fn() -> P>,
}

impl<P: RolePolicy> Deref for Authorized<P> {
    type Target = CurrentUser;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

#[rocket::async_trait]
impl<'r, P: RolePolicy> FromRequest<'r> for Authorized<P> {
    type Error = AuthRejection;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let user = match req.guard::<CurrentUser>().await {
            Outcome::Success(user) => user,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(status) => return Outcome::Forward(status),
        };

        if !P::ALLOWED.contains(&user.role) {
            return reject(req, AuthRejection::Forbidden);
        }

        Outcome::Success(Authorized {
            user,
            _policy: PhantomData,
        })
    }
}

fn bearer_security() -> RequestHeaderInput {
    let security_scheme = SecurityScheme {
        description: Some("Access token from POST /auth/login, sent as `Authorization: Bearer <token>`.".to_string()),
        data: SecuritySchemeData::Http {
            scheme: "bearer".to_string(),
            bearer_format: Some("JWT".to_string()),
        },
        extensions: Object::default(),
    };

    let mut security_req = SecurityRequirement::new();
    security_req.insert("bearerAuth".to_string(), Vec::new());

    RequestHeaderInput::Security("bearerAuth".to_string(), security_scheme, security_req)
}

fn auth_responses(include_forbidden: bool) -> Responses {
    let mut responses = Responses::default();
    responses.responses.insert(
        "401".to_string(),
        RefOr::Object(Response {
            description: "Unauthorized - missing, malformed, expired or wrong-kind token".to_string(),
            ..Default::default()
        }),
    );
    if include_forbidden {
        responses.responses.insert(
            "403".to_string(),
            RefOr::Object(Response {
                description: "Forbidden - role not allowed".to_string(),
                ..Default::default()
            }),
        );
    }
    responses
}

impl<'a> OpenApiFromRequest<'a> for CurrentUser {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(bearer_security())
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(auth_responses(false))
    }
}

impl<'a, P: RolePolicy> OpenApiFromRequest<'a> for Authorized<P> {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(bearer_security())
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(auth_responses(true))
    }
}
