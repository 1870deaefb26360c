use crate::auth::AuthRejection;
use crate::middleware::rate_limit::RateLimitRetryAfter;
use rocket::http::Header;
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::{Request, Responder, catch};

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Error {
    pub message: String,
}

impl Error {
    fn json(message: impl Into<String>) -> Json<Error> {
        Json(Error { message: message.into() })
    }
}

#[derive(Responder)]
#[response(status = 429, content_type = "json")]
pub struct TooManyRequests {
    body: Json<Error>,
    retry_after: Header<'static>,
}

#[catch(400)]
pub fn bad_request(_: &Request) -> Json<Error> {
    Error::json("Bad request")
}

#[catch(401)]
pub fn unauthorized(req: &Request) -> Json<Error> {
    let message = req
        .local_cache(|| None::<AuthRejection>)
        .map(|rejection| rejection.message())
        .unwrap_or("Unauthorized");
    Error::json(message)
}

#[catch(403)]
pub fn forbidden(req: &Request) -> Json<Error> {
    let message = req
        .local_cache(|| None::<AuthRejection>)
        .map(|rejection| rejection.message())
        .unwrap_or("Forbidden");
    Error::json(message)
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<Error> {
    Error::json("Not found")
}

#[catch(409)]
pub fn conflict(_: &Request) -> Json<Error> {
    Error::json("Conflict")
}

#[catch(413)]
pub fn payload_too_large(_: &Request) -> Json<Error> {
    Error::json("Payload too large")
}

#[catch(422)]
pub fn unprocessable_entity(_: &Request) -> Json<Error> {
    Error::json("Malformed request body")
}

#[catch(429)]
pub fn too_many_requests(req: &Request) -> TooManyRequests {
    let retry_after = req.local_cache(|| None::<RateLimitRetryAfter>).map(|r| r.0).unwrap_or(1);
    TooManyRequests {
        body: Error::json("Too many requests"),
        retry_after: Header::new("Retry-After", retry_after.to_string()),
    }
}

#[catch(500)]
pub fn internal_error(_: &Request) -> Json<Error> {
    Error::json("Internal server error")
}
