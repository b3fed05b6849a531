use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::AppError;
use crate::utils::photo::validate_photo;
use crate::utils::validation::{validate_not_blank, validate_payload};

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EmployeeRecord {
    pub id: i64,
    pub name: String,
    pub designation: String,
    pub department: String,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EmployeeRecord {
    pub fn key(&self) -> DuplicateKey<'_> {
        DuplicateKey {
            name: &self.name,
            designation: &self.designation,
            department: &self.department,
        }
    }
}

/// The (name, designation, department) triple two records must not share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DuplicateKey<'a> {
    pub name: &'a str,
    pub designation: &'a str,
    pub department: &'a str,
}

#[derive(Deserialize, Serialize, Validate, Debug, Clone)]
pub struct NewEmployee {
    #[validate(length(max = 255), custom = "validate_not_blank")]
    pub name: String,
    #[validate(length(max = 255), custom = "validate_not_blank")]
    pub designation: String,
    #[validate(length(max = 255), custom = "validate_not_blank")]
    pub department: String,
    #[validate(custom = "validate_photo")]
    pub photo_url: Option<String>,
}

impl NewEmployee {
    pub fn new(name: &str, designation: &str, department: &str) -> Self {
        Self {
            name: name.to_string(),
            designation: designation.to_string(),
            department: department.to_string(),
            photo_url: None,
        }
    }

    pub fn with_photo(mut self, photo_url: &str) -> Self {
        self.photo_url = Some(photo_url.to_string());
        self
    }

    /// Trims the text fields and validates the result. Every store calls this
    /// before touching its backend, so nothing blank is ever persisted.
    pub fn normalized(&self) -> Result<NewEmployee, AppError> {
        let trimmed = NewEmployee {
            name: self.name.trim().to_string(),
            designation: self.designation.trim().to_string(),
            department: self.department.trim().to_string(),
            photo_url: self
                .photo_url
                .as_deref()
                .map(str::trim)
                .filter(|photo| !photo.is_empty())
                .map(str::to_string),
        };
        validate_payload(&trimmed)?;
        Ok(trimmed)
    }

    pub fn key(&self) -> DuplicateKey<'_> {
        DuplicateKey {
            name: &self.name,
            designation: &self.designation,
            department: &self.department,
        }
    }

    pub fn into_record(self, id: i64, created_at: DateTime<Utc>) -> EmployeeRecord {
        EmployeeRecord {
            id,
            name: self.name,
            designation: self.designation,
            department: self.department,
            photo_url: self.photo_url,
            created_at,
            updated_at: None,
        }
    }
}

/// Creation timestamp, truncated to the microsecond precision every backend keeps.
pub fn now_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DedupReport {
    pub removed: usize,
    pub message: String,
}
