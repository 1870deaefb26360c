use crate::database::postgres_repository::{PostgresRepository, map_unique_violation};
use crate::error::app_error::AppError;
use crate::models::pagination::PaginationParams;
use crate::models::user::{NewUser, User, UserUpdateRequest};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, username, password_hash, role, created_at, updated_at, deleted_at";

#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, AppError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError>;
    async fn list_users(&self, pagination: &PaginationParams) -> Result<(Vec<User>, i64), AppError>;
    async fn update_user(&self, id: &Uuid, changes: &UserUpdateRequest) -> Result<User, AppError>;
    async fn soft_delete_user(&self, id: &Uuid) -> Result<(), AppError>;
}

#[async_trait::async_trait]
impl UserRepository for PostgresRepository {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, AppError> {
        let query = format!(
            r#"
            INSERT INTO users (email, username, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(&new_user.email)
            .bind(&new_user.username)
            .bind(&new_user.password_hash)
            .bind(new_user.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, AppError::EmailTaken))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted_at IS NULL");
        let user = sqlx::query_as::<_, User>(&query).bind(email).fetch_optional(&self.pool).await?;

        Ok(user)
    }

    async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
        let user = sqlx::query_as::<_, User>(&query).bind(id).fetch_optional(&self.pool).await?;

        Ok(user)
    }

    async fn list_users(&self, pagination: &PaginationParams) -> Result<(Vec<User>, i64), AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL")
            .fetch_one(&self.pool)
            .await?;

        let query = format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE deleted_at IS NULL
            ORDER BY created_at DESC, id
            LIMIT $1 OFFSET $2
            "#
        );
        let users = sqlx::query_as::<_, User>(&query)
            .bind(pagination.effective_page_size())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((users, total))
    }

    async fn update_user(&self, id: &Uuid, changes: &UserUpdateRequest) -> Result<User, AppError> {
        let query = format!(
            r#"
            UPDATE users
            SET username = COALESCE($1, username),
                email = COALESCE($2, email),
                updated_at = now()
            WHERE id = $3 AND deleted_at IS NULL
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(changes.username.as_deref())
            .bind(changes.email.as_deref())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, AppError::EmailTaken))?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn soft_delete_user(&self, id: &Uuid) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }
}
