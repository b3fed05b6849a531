use std::env;
use std::path::PathBuf;

use crate::db::BackendKind;
use crate::errors::AppError;

const DEFAULT_SQLITE_URL: &str = "sqlite://employees.db";
const DEFAULT_KV_PATH: &str = "employees.json";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendKind,
    pub database_url: Option<String>,
    pub kv_path: PathBuf,
    pub bind_addr: String,
    pub max_connections: u32,
}

impl Config {
    /// Reads the process environment. Call `dotenv().ok()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = var("DATABASE_URL");
        let backend = match var("DIRECTORY_BACKEND") {
            Some(name) => name.parse()?,
            None => detect_backend(database_url.as_deref())?,
        };

        if backend == BackendKind::Hosted && database_url.is_none() {
            return Err(AppError::Configuration(
                "DATABASE_URL must be set for the hosted backend".to_string(),
            ));
        }

        let max_connections = match var("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| AppError::Configuration(format!("Invalid DB_MAX_CONNECTIONS '{}'", raw)))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Config {
            backend,
            database_url,
            kv_path: var("DIRECTORY_KV_PATH").unwrap_or_else(|| DEFAULT_KV_PATH.to_string()).into(),
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            max_connections,
        })
    }

    /// Connection string for the SQL backends.
    pub fn database_url(&self) -> Result<String, AppError> {
        match (&self.database_url, self.backend) {
            (Some(url), _) => Ok(url.clone()),
            (None, BackendKind::Sql) => Ok(DEFAULT_SQLITE_URL.to_string()),
            (None, backend) => Err(AppError::Configuration(format!(
                "DATABASE_URL must be set for the {} backend",
                backend
            ))),
        }
    }
}

fn detect_backend(database_url: Option<&str>) -> Result<BackendKind, AppError> {
    match database_url {
        None => Ok(BackendKind::KeyValue),
        Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {
            Ok(BackendKind::Hosted)
        }
        Some(url) if url.starts_with("sqlite:") => Ok(BackendKind::Sql),
        Some(url) => Err(AppError::Configuration(format!(
            "Cannot pick a backend for DATABASE_URL '{}'",
            url.split(':').next().unwrap_or_default()
        ))),
    }
}
