use std::str::FromStr;

use async_trait::async_trait;
use chrono::SecondsFormat;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::db::{BackendKind, RecordStore};
use crate::errors::AppError;
use crate::models::employee::{now_timestamp, EmployeeRecord, NewEmployee};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS employees (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    designation TEXT NOT NULL,
    department TEXT NOT NULL,
    photo_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT
)";

// SQLite's default cap on bound parameters per statement
const MAX_BIND_VARIABLES: usize = 32766;

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_employees_created_at ON employees (created_at DESC)";

/// Employee records in an embedded SQLite database. Does not enforce the
/// (name, designation, department) uniqueness the hosted store checks.
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    pub async fn open(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|err| AppError::Configuration(format!("Invalid SQLite URL: {}", err)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(AppError::from_sqlx)?;

        Self::with_pool(pool).await
    }

    /// Private database that lives as long as the store. Held on a single
    /// connection, since every SQLite memory connection is its own database.
    pub async fn in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(AppError::from_sqlx)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(AppError::from_sqlx)?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, AppError> {
        sqlx::query(CREATE_TABLE).execute(&pool).await.map_err(AppError::from_sqlx)?;
        sqlx::query(CREATE_INDEX).execute(&pool).await.map_err(AppError::from_sqlx)?;
        log::debug!("SQLite employees table ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for SqlStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Sql
    }

    async fn add(&self, employee: &NewEmployee) -> Result<EmployeeRecord, AppError> {
        let employee = employee.normalized()?;
        let now = now_timestamp();

        // Fixed-width text so ORDER BY created_at sorts chronologically
        let result = sqlx::query(
            "INSERT INTO employees (name, designation, department, photo_url, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&employee.name)
        .bind(&employee.designation)
        .bind(&employee.department)
        .bind(&employee.photo_url)
        .bind(now.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await
        .map_err(AppError::from_sqlx)?;

        let id = result.last_insert_rowid();
        log::debug!("Employee added to SQLite with ID: {}", id);
        Ok(employee.into_record(id, now))
    }

    async fn fetch_all(&self) -> Result<Vec<EmployeeRecord>, AppError> {
        sqlx::query_as::<_, EmployeeRecord>(
            "SELECT id, name, designation, department, photo_url, created_at, updated_at FROM employees ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from_sqlx)
    }

    async fn delete_one(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM employees WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from_sqlx)?;
        log::debug!("Deleted employee {} ({} rows)", id, result.rows_affected());
        Ok(())
    }

    async fn delete_many(&self, ids: &[i64]) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }

        // Every chunk commits together or not at all
        let mut tx = self.pool.begin().await.map_err(AppError::from_sqlx)?;
        let mut deleted = 0;
        for chunk in ids.chunks(MAX_BIND_VARIABLES) {
            let mut query: sqlx::QueryBuilder<'_, sqlx::Sqlite> =
                sqlx::QueryBuilder::new("DELETE FROM employees WHERE id IN (");
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            let result = query.build().execute(&mut *tx).await.map_err(AppError::from_sqlx)?;
            deleted += result.rows_affected();
        }
        tx.commit().await.map_err(AppError::from_sqlx)?;
        Ok(deleted)
    }

    async fn clear_all(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM employees")
            .execute(&self.pool)
            .await
            .map_err(AppError::from_sqlx)?;
        log::info!("All employees deleted from SQLite");
        Ok(())
    }
}
