pub mod rate_limit;

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::{Data, Response};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use tracing::{info, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Correlation id for one request, echoed back in `X-Request-Id`.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }

    /// Reuses a caller-supplied id when it is a UUID; anything else is
    /// replaced so arbitrary header text never reaches the logs.
    fn from_header(value: Option<&str>) -> Self {
        value
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(|id| RequestId(id.to_string()))
            .unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestId {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let cached = request.local_cache(|| None::<RequestId>).clone();
        Outcome::Success(cached.unwrap_or_default())
    }
}

impl<'a> OpenApiFromRequest<'a> for RequestId {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

/// Assigns the request id, logs start and completion, sets security headers.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let request_id = RequestId::from_header(request.headers().get_one(REQUEST_ID_HEADER));
        request.local_cache(|| Some(request_id.clone()));

        info!(
            request_id = %request_id.0,
            method = %request.method(),
            uri = %request.uri(),
            "incoming request"
        );
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let request_id = request
            .local_cache(|| None::<RequestId>)
            .as_ref()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| "unknown".to_string());

        response.set_header(Header::new(REQUEST_ID_HEADER, request_id.clone()));
        response.set_header(Header::new("X-Content-Type-Options", "nosniff"));
        response.set_header(Header::new("X-Frame-Options", "DENY"));
        // Responses carry patient data.
        response.set_header(Header::new("Cache-Control", "no-store"));

        let status = response.status();
        if status.class().is_server_error() || status.class().is_client_error() {
            warn!(
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                status = %status.code,
                "request completed with error"
            );
        } else {
            info!(
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                status = %status.code,
                "request completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::Status;
    use rocket::local::asynchronous::Client;
    use rocket::{get, routes};

    #[get("/echo")]
    fn echo(request_id: RequestId) -> String {
        request_id.0
    }

    async fn client() -> Client {
        let rocket = rocket::build().attach(RequestLogger).mount("/", routes![echo]);
        Client::tracked(rocket).await.expect("valid rocket instance")
    }

    #[test]
    fn request_ids_are_unique_uuids() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a.0, b.0);
        assert!(Uuid::parse_str(&a.0).is_ok());
    }

    #[test]
    fn non_uuid_header_is_replaced() {
        let id = RequestId::from_header(Some("<script>"));
        assert!(Uuid::parse_str(&id.0).is_ok());

        let supplied = Uuid::new_v4().to_string();
        assert_eq!(RequestId::from_header(Some(&supplied)).0, supplied);
    }

    #[rocket::async_test]
    async fn response_carries_request_id_and_security_headers() {
        let client = client().await;
        let response = client.get("/echo").dispatch().await;

        assert_eq!(response.status(), Status::Ok);
        let header = response.headers().get_one(REQUEST_ID_HEADER).map(str::to_string);
        assert_eq!(response.headers().get_one("Cache-Control"), Some("no-store"));
        assert_eq!(response.headers().get_one("X-Frame-Options"), Some("DENY"));
        assert_eq!(header, response.into_string().await);
    }

    #[rocket::async_test]
    async fn supplied_request_id_is_echoed() {
        let client = client().await;
        let supplied = Uuid::new_v4().to_string();
        let response = client.get("/echo").header(Header::new(REQUEST_ID_HEADER, supplied.clone())).dispatch().await;

        assert_eq!(response.headers().get_one(REQUEST_ID_HEADER), Some(supplied.as_str()));
    }
}
