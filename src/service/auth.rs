use crate::database::user::UserRepository;
use crate::error::app_error::AppError;
use crate::models::pagination::PaginationParams;
use crate::models::user::{NewUser, Role, User, UserUpdateRequest};
use crate::service::password::PasswordHasher;
use crate::service::token::{TokenKind, TokenPair, TokenService};
use tracing::{info, warn};
use uuid::Uuid;

/// Credential lifecycle: registration, login, token refresh and account
/// maintenance.
pub struct AuthService<'a, R: UserRepository> {
    repo: &'a R,
    tokens: &'a TokenService,
    passwords: &'a PasswordHasher,
}

impl<'a, R: UserRepository> AuthService<'a, R> {
    pub fn new(repo: &'a R, tokens: &'a TokenService, passwords: &'a PasswordHasher) -> Self {
        AuthService { repo, tokens, passwords }
    }

    pub async fn register(&self, email: &str, username: &str, password: &str) -> Result<User, AppError> {
        // An existing account already reveals itself through the conflict, so
        // skip the hash entirely.
        if self.repo.get_user_by_email(email).await?.is_some() {
            return Err(AppError::EmailTaken);
        }

        let password_hash = self.passwords.hash(password)?;
        let user = self
            .repo
            .create_user(&NewUser {
                email: email.to_string(),
                username: username.to_string(),
                password_hash,
                role: Role::User,
            })
            .await?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, TokenPair), AppError> {
        let Some(user) = self.repo.get_user_by_email(email).await? else {
            self.passwords.dummy_verify(password);
            warn!("login failed");
            return Err(AppError::InvalidCredentials);
        };

        if !self.passwords.verify(password, &user.password_hash)? {
            warn!(user_id = %user.id, "login failed");
            return Err(AppError::InvalidCredentials);
        }

        let tokens = self.tokens.issue_pair(user.id, user.role)?;
        info!(user_id = %user.id, "user logged in");
        Ok((user, tokens))
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self
            .tokens
            .verify_kind(refresh_token, TokenKind::Refresh)
            .map_err(|_| AppError::InvalidRefreshToken)?;

        let user = self.repo.get_user_by_id(&claims.sub).await?.ok_or(AppError::InvalidCredentials)?;

        Ok(self.tokens.issue_pair(user.id, user.role)?)
    }

    pub async fn get_user(&self, id: &Uuid) -> Result<User, AppError> {
        self.repo
            .get_user_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn list_users(&self, pagination: &PaginationParams) -> Result<(Vec<User>, i64), AppError> {
        self.repo.list_users(pagination).await
    }

    pub async fn update(&self, id: &Uuid, changes: &UserUpdateRequest) -> Result<User, AppError> {
        if let Some(email) = &changes.email
            && let Some(existing) = self.repo.get_user_by_email(email).await?
            && existing.id != *id
        {
            return Err(AppError::EmailTaken);
        }

        self.repo.update_user(id, changes).await
    }

    pub async fn soft_delete(&self, id: &Uuid) -> Result<(), AppError> {
        self.repo.soft_delete_user(id).await?;
        info!(user_id = %id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockRepository, test_password_hasher, test_token_service};

    #[tokio::test]
    async fn register_then_login() {
        let repo = MockRepository::new();
        let (tokens, passwords) = (test_token_service(), test_password_hasher());
        let service = AuthService::new(&repo, &tokens, &passwords);

        let user = service.register("a@example.com", "alice", "password123").await.unwrap();
        assert_eq!(user.role, Role::User);
        assert_ne!(user.password_hash, "password123");

        let (logged_in, pair) = service.login("a@example.com", "password123").await.unwrap();
        assert_eq!(logged_in.id, user.id);

        let claims = tokens.verify_kind(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Role::User);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected_without_a_second_record() {
        let repo = MockRepository::new();
        let (tokens, passwords) = (test_token_service(), test_password_hasher());
        let service = AuthService::new(&repo, &tokens, &passwords);

        service.register("dup@example.com", "one", "password123").await.unwrap();
        let err = service.register("dup@example.com", "two", "password456").await.unwrap_err();

        assert!(matches!(err, AppError::EmailTaken));
        assert_eq!(repo.user_count(), 1);
    }

    #[tokio::test]
    async fn unique_index_race_surfaces_as_email_taken() {
        let repo = MockRepository::new();
        repo.fail_user_insert_with_conflict();
        let (tokens, passwords) = (test_token_service(), test_password_hasher());
        let service = AuthService::new(&repo, &tokens, &passwords);

        let err = service.register("race@example.com", "r", "password123").await.unwrap_err();
        assert!(matches!(err, AppError::EmailTaken));
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_identical() {
        let repo = MockRepository::new();
        let (tokens, passwords) = (test_token_service(), test_password_hasher());
        let service = AuthService::new(&repo, &tokens, &passwords);
        service.register("known@example.com", "k", "password123").await.unwrap();

        let unknown = service.login("nobody@example.com", "password123").await.unwrap_err();
        let wrong = service.login("known@example.com", "wrong-password").await.unwrap_err();

        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn refresh_issues_fresh_pair_for_same_subject() {
        let repo = MockRepository::new();
        let (tokens, passwords) = (test_token_service(), test_password_hasher());
        let service = AuthService::new(&repo, &tokens, &passwords);
        let u1 = service.register("u1@example.com", "u1", "password123").await.unwrap();

        let issued_at = chrono::Utc::now() - chrono::Duration::hours(2);
        let old = tokens.issue_at(u1.id, Role::User, TokenKind::Refresh, issued_at).unwrap();
        let old_claims = tokens.verify(&old.token).unwrap();

        let before = chrono::Utc::now();
        let pair = service.refresh(&old.token).await.unwrap();
        let after = chrono::Utc::now();

        let claims = tokens.verify(&pair.access_token).unwrap();
        assert_eq!(claims.sub, u1.id);
        assert_eq!(claims.kind, TokenKind::Access);

        let fifteen = chrono::Duration::minutes(15);
        assert!(pair.access_expires_at >= before + fifteen);
        assert!(pair.access_expires_at <= after + fifteen);

        let refreshed = tokens.verify(&pair.refresh_token).unwrap();
        assert_ne!(refreshed.exp, old_claims.exp);
        assert!(refreshed.exp > old_claims.exp);
        assert!(claims.iat >= issued_at.timestamp() + 2 * 3600);
    }

    #[tokio::test]
    async fn refresh_uses_current_role() {
        let repo = MockRepository::new();
        let (tokens, passwords) = (test_token_service(), test_password_hasher());
        let service = AuthService::new(&repo, &tokens, &passwords);
        let user = service.register("promoted@example.com", "p", "password123").await.unwrap();
        repo.set_role(&user.id, Role::Admin);

        let refresh = tokens.issue(user.id, Role::User, TokenKind::Refresh).unwrap();
        let pair = service.refresh(&refresh).await.unwrap();

        assert_eq!(tokens.verify(&pair.access_token).unwrap().role, Role::Admin);
    }

    #[tokio::test]
    async fn refresh_rejects_access_tokens_and_garbage() {
        let repo = MockRepository::new();
        let (tokens, passwords) = (test_token_service(), test_password_hasher());
        let service = AuthService::new(&repo, &tokens, &passwords);
        let user = service.register("x@example.com", "x", "password123").await.unwrap();

        let access = tokens.issue(user.id, Role::User, TokenKind::Access).unwrap();
        assert!(matches!(service.refresh(&access).await.unwrap_err(), AppError::InvalidRefreshToken));
        assert!(matches!(service.refresh("not-a-token").await.unwrap_err(), AppError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn refresh_for_deleted_user_is_invalid_credentials() {
        let repo = MockRepository::new();
        let (tokens, passwords) = (test_token_service(), test_password_hasher());
        let service = AuthService::new(&repo, &tokens, &passwords);
        let user = service.register("gone@example.com", "g", "password123").await.unwrap();
        service.soft_delete(&user.id).await.unwrap();

        let refresh = tokens.issue(user.id, Role::User, TokenKind::Refresh).unwrap();
        assert!(matches!(service.refresh(&refresh).await.unwrap_err(), AppError::InvalidCredentials));
        assert!(matches!(
            service.login("gone@example.com", "password123").await.unwrap_err(),
            AppError::InvalidCredentials
        ));
    }

    #[tokio::test]
    async fn update_rejects_email_of_another_user() {
        let repo = MockRepository::new();
        let (tokens, passwords) = (test_token_service(), test_password_hasher());
        let service = AuthService::new(&repo, &tokens, &passwords);
        service.register("first@example.com", "f", "password123").await.unwrap();
        let second = service.register("second@example.com", "s", "password123").await.unwrap();

        let changes = UserUpdateRequest {
            email: Some("first@example.com".to_string()),
            ..Default::default()
        };
        assert!(matches!(service.update(&second.id, &changes).await.unwrap_err(), AppError::EmailTaken));

        let rename = UserUpdateRequest {
            username: Some("renamed".to_string()),
            ..Default::default()
        };
        assert_eq!(service.update(&second.id, &rename).await.unwrap().username, "renamed");
    }
}
