use crate::Config;
use crate::config::PasswordConfig;
use crate::database::attachment::AttachmentRepository;
use crate::database::user::UserRepository;
use crate::error::app_error::AppError;
use crate::models::attachment::{Attachment, NewAttachment};
use crate::models::pagination::PaginationParams;
use crate::models::user::{NewUser, Role, User, UserUpdateRequest};
use crate::service::password::PasswordHasher;
use crate::service::token::TokenService;
use crate::storage::{ObjectStorage, StorageError};
use bytes::Bytes;
use chrono::{Duration, Utc};
use rocket::http::{ContentType, Header};
use rocket::local::asynchronous::Client;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-do-not-use";

pub fn test_token_service() -> TokenService {
    TokenService::new(TEST_JWT_SECRET, Duration::minutes(15), Duration::days(7)).expect("valid test secret")
}

/// Argon2 with the smallest legal cost so tests stay fast.
pub fn test_password_hasher() -> PasswordHasher {
    PasswordHasher::from_config(&PasswordConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("valid test params")
}

/// Full application config for route tests against a live database.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = Some(TEST_JWT_SECRET.to_string());
    config.password = PasswordConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };
    config.rate_limit.auth_limit = 1000;
    config.rate_limit.mutation_limit = 1000;
    config
}

/// Registers a fresh account through the API and returns its id plus a
/// ready-made `Authorization` header.
pub async fn sign_up(client: &Client) -> (Uuid, Header<'static>) {
    let email = format!("{}@example.com", Uuid::new_v4());
    let credentials = json!({"email": email, "username": "clinician", "password": "correct horse"});

    client
        .post("/api/v1/auth/register")
        .header(ContentType::JSON)
        .body(credentials.to_string())
        .dispatch()
        .await;
    let login: Value = client
        .post("/api/v1/auth/login")
        .header(ContentType::JSON)
        .body(credentials.to_string())
        .dispatch()
        .await
        .into_json()
        .await
        .expect("login response");

    let id = login["user"]["id"].as_str().and_then(|id| Uuid::parse_str(id).ok()).expect("user id");
    let token = login["tokens"]["access_token"].as_str().expect("access token");
    (id, Header::new("Authorization", format!("Bearer {}", token)))
}

/// Cross-system side effects in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    Put(String),
    Delete(String),
    Presign(String),
    RecordInsert(String),
}

pub type EventLog = Arc<Mutex<Vec<StorageEvent>>>;

pub fn new_event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(events: &EventLog, event: StorageEvent) {
    events.lock().expect("event log poisoned").push(event);
}

#[derive(Default)]
pub struct MockRepository {
    users: Mutex<Vec<User>>,
    attachments: Mutex<Vec<Attachment>>,
    events: Option<EventLog>,
    user_insert_conflict: AtomicBool,
    attachment_insert_fails: AtomicBool,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: EventLog) -> Self {
        Self {
            events: Some(events),
            ..Self::default()
        }
    }

    /// Simulates a concurrent insert winning the unique index.
    pub fn fail_user_insert_with_conflict(&self) {
        self.user_insert_conflict.store(true, Ordering::SeqCst);
    }

    pub fn fail_attachment_insert(&self) {
        self.attachment_insert_fails.store(true, Ordering::SeqCst);
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().iter().filter(|u| u.deleted_at.is_none()).count()
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments.lock().unwrap().len()
    }

    pub fn set_role(&self, id: &Uuid, role: Role) {
        if let Some(user) = self.users.lock().unwrap().iter_mut().find(|u| u.id == *id) {
            user.role = role;
        }
    }
}

#[async_trait::async_trait]
impl UserRepository for MockRepository {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, AppError> {
        if self.user_insert_conflict.load(Ordering::SeqCst) {
            return Err(AppError::EmailTaken);
        }

        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == new_user.email && u.deleted_at.is_none()) {
            return Err(AppError::EmailTaken);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email.clone(),
            username: new_user.username.clone(),
            password_hash: new_user.password_hash.clone(),
            role: new_user.role,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.email == email && u.deleted_at.is_none()).cloned())
    }

    async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.id == *id && u.deleted_at.is_none()).cloned())
    }

    async fn list_users(&self, pagination: &PaginationParams) -> Result<(Vec<User>, i64), AppError> {
        let users = self.users.lock().unwrap();
        let live: Vec<User> = users.iter().filter(|u| u.deleted_at.is_none()).cloned().collect();
        let total = live.len() as i64;
        let page = live
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.effective_page_size() as usize)
            .collect();
        Ok((page, total))
    }

    async fn update_user(&self, id: &Uuid, changes: &UserUpdateRequest) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == *id && u.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if let Some(username) = &changes.username {
            user.username = username.clone();
        }
        if let Some(email) = &changes.email {
            user.email = email.clone();
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn soft_delete_user(&self, id: &Uuid) -> Result<(), AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == *id && u.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        user.deleted_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait::async_trait]
impl AttachmentRepository for MockRepository {
    async fn create_attachment(&self, attachment: &NewAttachment) -> Result<Attachment, AppError> {
        if let Some(events) = &self.events {
            record(events, StorageEvent::RecordInsert(attachment.storage_key.clone()));
        }

        if self.attachment_insert_fails.load(Ordering::SeqCst) {
            return Err(AppError::db("insert attachment", sqlx::Error::PoolTimedOut));
        }

        let created = Attachment {
            id: Uuid::new_v4(),
            note_id: attachment.note_id,
            message_id: attachment.message_id,
            url: attachment.url.clone(),
            name: attachment.name.clone(),
            mime_type: attachment.mime_type.clone(),
            size_bytes: attachment.size_bytes,
            storage_key: attachment.storage_key.clone(),
            created_at: Utc::now(),
        };
        self.attachments.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn list_attachments_for_note(&self, note_id: &Uuid) -> Result<Vec<Attachment>, AppError> {
        let attachments = self.attachments.lock().unwrap();
        Ok(attachments.iter().filter(|a| a.note_id == *note_id).cloned().collect())
    }
}

/// In-memory object store sharing an event log with [`MockRepository`].
pub struct MockObjectStorage {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
    events: EventLog,
    put_fails: AtomicBool,
    delete_fails: AtomicBool,
    presign_fails: AtomicBool,
}

impl MockObjectStorage {
    pub fn new(events: EventLog) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            events,
            put_fails: AtomicBool::new(false),
            delete_fails: AtomicBool::new(false),
            presign_fails: AtomicBool::new(false),
        }
    }

    pub fn fail_puts(&self) {
        self.put_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self) {
        self.delete_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_presigns(&self) {
        self.presign_fails.store(true, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn content_type_of(&self, key: &str) -> Option<String> {
        self.objects.lock().unwrap().get(key).map(|(_, ct)| ct.clone())
    }
}

#[async_trait::async_trait]
impl ObjectStorage for MockObjectStorage {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String, StorageError> {
        record(&self.events, StorageEvent::Put(key.to_string()));
        if self.put_fails.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("put rejected".to_string()));
        }

        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(format!("https://bucket.test/{}", key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        record(&self.events, StorageEvent::Delete(key.to_string()));
        if self.delete_fails.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("delete rejected".to_string()));
        }

        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn presign(&self, key: &str, _ttl: std::time::Duration) -> Result<String, StorageError> {
        record(&self.events, StorageEvent::Presign(key.to_string()));
        if self.presign_fails.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("presign rejected".to_string()));
        }
        Ok(format!("https://signed.test/{}", key))
    }
}
