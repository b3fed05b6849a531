use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Employee already exists with the same name, designation, and department")]
    DuplicateRecord,
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Internal Server Error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    /// Classifies a sqlx failure into the directory's error taxonomy.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // undefined_table
                Some("42P01") => AppError::BackendUnavailable(
                    "employees table not found, apply migrations/postgres/0001_employees.sql first".to_string(),
                ),
                // insufficient_privilege
                Some("42501") => AppError::PermissionDenied(db_err.message().to_string()),
                // unique_violation
                Some("23505") => AppError::DuplicateRecord,
                _ if db_err.message().contains("no such table") => AppError::BackendUnavailable(
                    "employees table not found".to_string(),
                ),
                _ => AppError::BackendUnavailable(db_err.message().to_string()),
            },
            _ => AppError::BackendUnavailable(err.to_string()),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateRecord => StatusCode::CONFLICT,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Configuration(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse { error: self.to_string() })
    }
}
