use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use std::sync::LazyLock;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

/// E.164-style international numbers or national numbers with a leading zero.
pub static PHONE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\+?[1-9]\d{1,14}|0\d{8,14})$").expect("valid phone regex"));

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    #[default]
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
            Gender::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown gender: {0}")]
pub struct UnknownGender(pub String);

impl TryFrom<String> for Gender {
    type Error = UnknownGender;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            "unknown" => Ok(Gender::Unknown),
            _ => Err(UnknownGender(value)),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Patient {
    pub id: Uuid,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    #[sqlx(try_from = "String")]
    pub gender: Gender,
    pub full_address: Option<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct PatientRequest {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(regex(path = *PHONE_NUMBER))]
    #[schemars(regex(path = "PHONE_NUMBER"))]
    pub phone_number: Option<String>,
    /// ISO date, `YYYY-MM-DD`.
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    #[validate(length(max = 500))]
    pub full_address: Option<String>,
}

#[derive(Deserialize, Debug, Default, Validate, JsonSchema)]
pub struct PatientUpdateRequest {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    #[validate(regex(path = *PHONE_NUMBER))]
    #[schemars(regex(path = "PHONE_NUMBER"))]
    pub phone_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    #[validate(length(max = 500))]
    pub full_address: Option<String>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct PatientResponse {
    pub id: Uuid,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
    pub full_address: Option<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Patient> for PatientResponse {
    fn from(patient: &Patient) -> Self {
        Self {
            id: patient.id,
            email: patient.email.clone(),
            first_name: patient.first_name.clone(),
            last_name: patient.last_name.clone(),
            phone_number: patient.phone_number.clone(),
            date_of_birth: patient.date_of_birth,
            gender: patient.gender,
            full_address: patient.full_address.clone(),
            user_id: patient.user_id,
            created_at: patient.created_at,
            updated_at: patient.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(phone: Option<&str>) -> PatientRequest {
        PatientRequest {
            email: Some("jane@example.com".to_string()),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            phone_number: phone.map(str::to_string),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 12),
            gender: Some(Gender::Female),
            full_address: None,
        }
    }

    #[test]
    fn phone_numbers() {
        for ok in ["+61412345678", "61412345678", "0412345678"] {
            assert!(request(Some(ok)).validate().is_ok(), "{ok}");
        }
        for bad in ["+0412345678", "041234", "phone", "+1 555 0100"] {
            assert!(request(Some(bad)).validate().is_err(), "{bad}");
        }
        assert!(request(None).validate().is_ok());
    }

    #[test]
    fn gender_round_trips_through_text() {
        for gender in [Gender::Male, Gender::Female, Gender::Other, Gender::Unknown] {
            assert_eq!(Gender::try_from(gender.as_str().to_string()).unwrap(), gender);
        }
        assert!(Gender::try_from("x".to_string()).is_err());
    }

    #[test]
    fn date_of_birth_is_iso() {
        let parsed: PatientRequest = serde_json::from_str(r#"{"first_name":"A","last_name":"B","date_of_birth":"2001-02-03"}"#).unwrap();
        assert_eq!(parsed.date_of_birth, NaiveDate::from_ymd_opt(2001, 2, 3));
        assert!(serde_json::from_str::<PatientRequest>(r#"{"first_name":"A","last_name":"B","date_of_birth":"03/02/2001"}"#).is_err());
    }
}
