use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::bearer_token;
use crate::config::RateLimitConfig;
use crate::middleware::RequestId;
use crate::service::token::TokenService;
use rocket::http::{Method, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

/// Which quota a request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Bucket {
    Read,
    Mutation,
    Auth,
}

impl Bucket {
    fn for_method(method: Method) -> Self {
        match method {
            Method::Post | Method::Put | Method::Patch | Method::Delete => Bucket::Mutation,
            _ => Bucket::Read,
        }
    }
}

/// What a request is counted against. A request with a valid session token
/// is counted against its address and its account at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Scope {
    Address(IpAddr),
    Account(Uuid),
    /// No address and no session; all such requests share one quota.
    Anonymous,
}

#[derive(Debug)]
struct Window {
    opened: Instant,
    hits: u32,
}

impl Window {
    fn open(now: Instant) -> Self {
        Window { opened: now, hits: 0 }
    }

    /// Time left in this window, or `None` once it has run out.
    fn remaining(&self, now: Instant, length: Duration) -> Option<Duration> {
        length
            .checked_sub(now.saturating_duration_since(self.opened))
            .filter(|left| !left.is_zero())
    }
}

/// Fixed-window quotas per (scope, bucket). Windows open lazily and are
/// swept by [`RateLimiter::spawn_cleanup_task`].
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Duration,
    windows: Mutex<HashMap<(Scope, Bucket), Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let window = Duration::from_secs(config.window_seconds.max(1));
        Self {
            config,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn spawn_cleanup_task(self: Arc<Self>) {
        let interval = Duration::from_secs(self.config.cleanup_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                self.windows.lock().await.retain(|_, w| w.remaining(now, self.window).is_some());
            }
        });
    }

    fn quota(&self, bucket: Bucket) -> u32 {
        match bucket {
            Bucket::Read => self.config.read_limit,
            Bucket::Mutation => self.config.mutation_limit,
            Bucket::Auth => self.config.auth_limit,
        }
    }

    /// Takes one hit from every scope's quota. When any scope is exhausted
    /// nothing is taken and the longest wait among them is returned.
    async fn acquire(&self, scopes: &[Scope], bucket: Bucket, now: Instant) -> Result<(), Duration> {
        let quota = self.quota(bucket);
        let mut windows = self.windows.lock().await;

        let wait = scopes
            .iter()
            .filter_map(|scope| {
                let window = windows.entry((*scope, bucket)).or_insert_with(|| Window::open(now));
                match window.remaining(now, self.window) {
                    None => {
                        *window = Window::open(now);
                        None
                    }
                    Some(left) if window.hits >= quota => Some(left),
                    Some(_) => None,
                }
            })
            .max();

        if let Some(wait) = wait {
            return Err(wait);
        }

        for scope in scopes {
            windows.entry((*scope, bucket)).and_modify(|w| w.hits += 1);
        }
        Ok(())
    }
}

/// Request guard drawing from the read or mutation quota by method.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit;

/// Request guard for login, registration and refresh.
#[derive(Debug, Clone, Copy)]
pub struct AuthRateLimit;

/// Seconds until the caller may retry; read by the 429 catcher.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRetryAfter(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    TooManyRequests,
    MissingClientIp,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RateLimit {
    type Error = RateLimitError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        throttle(request, Bucket::for_method(request.method())).await.map(|_| RateLimit)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthRateLimit {
    type Error = RateLimitError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        throttle(request, Bucket::Auth).await.map(|_| AuthRateLimit)
    }
}

impl<'a> OpenApiFromRequest<'a> for RateLimit {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(too_many_requests_response())
    }
}

impl<'a> OpenApiFromRequest<'a> for AuthRateLimit {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(too_many_requests_response())
    }
}

/// Account behind a verified bearer token. Unverifiable tokens add nothing;
/// the session guard rejects them on its own.
fn session_account(request: &Request<'_>) -> Option<Uuid> {
    let tokens = request.rocket().state::<TokenService>()?;
    let header = request.headers().get_one("Authorization")?;
    tokens.verify(bearer_token(header)?).ok().map(|claims| claims.sub)
}

fn scopes(request: &Request<'_>) -> Vec<Scope> {
    request
        .client_ip()
        .map(Scope::Address)
        .into_iter()
        .chain(session_account(request).map(Scope::Account))
        .collect()
}

/// Whole seconds, rounded up so a client never retries early.
fn retry_after_secs(wait: Duration) -> u64 {
    wait.as_secs_f64().ceil().max(1.0) as u64
}

async fn throttle(request: &Request<'_>, bucket: Bucket) -> Outcome<(), RateLimitError> {
    let Some(limiter) = request.rocket().state::<Arc<RateLimiter>>() else {
        return Outcome::Success(());
    };
    let request_id = request.local_cache(|| None::<RequestId>).as_ref().map(|r| r.0.clone()).unwrap_or_default();

    let mut scopes = scopes(request);
    if scopes.is_empty() {
        warn!(request_id = %request_id, uri = %request.uri(), "client ip unavailable for rate limiting");
        if limiter.config.require_client_ip {
            return Outcome::Error((Status::BadRequest, RateLimitError::MissingClientIp));
        }
        scopes.push(Scope::Anonymous);
    }

    match limiter.acquire(&scopes, bucket, Instant::now()).await {
        Ok(()) => Outcome::Success(()),
        Err(wait) => {
            let secs = retry_after_secs(wait);
            request.local_cache(|| Some(RateLimitRetryAfter(secs)));
            warn!(
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                bucket = ?bucket,
                retry_after_secs = secs,
                "rate limit exceeded"
            );
            Outcome::Error((Status::TooManyRequests, RateLimitError::TooManyRequests))
        }
    }
}

fn too_many_requests_response() -> Responses {
    let mut responses = Responses::default();
    responses.responses.insert(
        "429".to_string(),
        RefOr::Object(OpenApiResponse {
            description: "Too Many Requests".to_string(),
            ..Default::default()
        }),
    );
    responses
}
