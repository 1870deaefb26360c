use crate::database::postgres_repository::{PostgresRepository, map_unique_violation};
use crate::error::app_error::AppError;
use crate::models::pagination::PaginationParams;
use crate::models::patient::{Gender, Patient, PatientRequest, PatientUpdateRequest};
use uuid::Uuid;

const PATIENT_COLUMNS: &str = "id, email, first_name, last_name, phone_number, date_of_birth, gender, full_address, user_id, created_at, updated_at";

impl PostgresRepository {
    pub async fn create_patient(&self, request: &PatientRequest, owner_id: &Uuid) -> Result<Patient, AppError> {
        let query = format!(
            r#"
            INSERT INTO patients (email, first_name, last_name, phone_number, date_of_birth, gender, full_address, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PATIENT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Patient>(&query)
            .bind(request.email.as_deref())
            .bind(&request.first_name)
            .bind(&request.last_name)
            .bind(request.phone_number.as_deref())
            .bind(request.date_of_birth)
            .bind(request.gender.unwrap_or_default().as_str())
            .bind(request.full_address.as_deref())
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, AppError::EmailTaken))
    }

    pub async fn get_patient_by_id(&self, id: &Uuid) -> Result<Option<Patient>, AppError> {
        let query = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = $1 AND deleted_at IS NULL");
        let patient = sqlx::query_as::<_, Patient>(&query).bind(id).fetch_optional(&self.pool).await?;

        Ok(patient)
    }

    pub async fn find_patient_by_email(&self, email: &str) -> Result<Option<Patient>, AppError> {
        let query = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE email = $1 AND deleted_at IS NULL");
        let patient = sqlx::query_as::<_, Patient>(&query).bind(email).fetch_optional(&self.pool).await?;

        Ok(patient)
    }

    pub async fn find_patient_by_phone(&self, phone_number: &str) -> Result<Option<Patient>, AppError> {
        let query = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE phone_number = $1 AND deleted_at IS NULL");
        let patient = sqlx::query_as::<_, Patient>(&query).bind(phone_number).fetch_optional(&self.pool).await?;

        Ok(patient)
    }

    /// Lists live patients; `owner_id = None` lists every owner's patients.
    pub async fn list_patients(&self, owner_id: Option<&Uuid>, pagination: &PaginationParams) -> Result<(Vec<Patient>, i64), AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patients WHERE deleted_at IS NULL AND ($1::uuid IS NULL OR user_id = $1)")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;

        let query = format!(
            r#"
            SELECT {PATIENT_COLUMNS}
            FROM patients
            WHERE deleted_at IS NULL AND ($1::uuid IS NULL OR user_id = $1)
            ORDER BY last_name, first_name, id
            LIMIT $2 OFFSET $3
            "#
        );
        let patients = sqlx::query_as::<_, Patient>(&query)
            .bind(owner_id)
            .bind(pagination.effective_page_size())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((patients, total))
    }

    pub async fn update_patient(&self, id: &Uuid, changes: &PatientUpdateRequest) -> Result<Patient, AppError> {
        let query = format!(
            r#"
            UPDATE patients
            SET email = COALESCE($1, email),
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                phone_number = COALESCE($4, phone_number),
                date_of_birth = COALESCE($5, date_of_birth),
                gender = COALESCE($6, gender),
                full_address = COALESCE($7, full_address),
                updated_at = now()
            WHERE id = $8 AND deleted_at IS NULL
            RETURNING {PATIENT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Patient>(&query)
            .bind(changes.email.as_deref())
            .bind(changes.first_name.as_deref())
            .bind(changes.last_name.as_deref())
            .bind(changes.phone_number.as_deref())
            .bind(changes.date_of_birth)
            .bind(changes.gender.as_ref().map(Gender::as_str))
            .bind(changes.full_address.as_deref())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, AppError::EmailTaken))?
            .ok_or_else(|| AppError::NotFound("Patient not found".to_string()))
    }

    pub async fn soft_delete_patient(&self, id: &Uuid) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE patients SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Patient not found".to_string()));
        }
        Ok(())
    }
}
