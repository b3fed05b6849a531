pub mod kv;
pub mod postgres;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::employee::{EmployeeRecord, NewEmployee};

pub use kv::KeyValueStore;
pub use postgres::HostedStore;
pub use sqlite::SqlStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Embedded SQLite database.
    Sql,
    /// JSON document on local disk.
    KeyValue,
    /// Hosted PostgreSQL with change notifications.
    Hosted,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Sql => write!(f, "sql"),
            BackendKind::KeyValue => write!(f, "kv"),
            BackendKind::Hosted => write!(f, "hosted"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sql" | "sqlite" => Ok(BackendKind::Sql),
            "kv" | "local" => Ok(BackendKind::KeyValue),
            "hosted" | "postgres" => Ok(BackendKind::Hosted),
            other => Err(AppError::Configuration(format!("Unknown backend '{}'", other))),
        }
    }
}

/// Kind of mutation a change notification reports. Consumers only use it for
/// logging, every event triggers the same full re-fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert,
    Update,
    Delete,
    Truncate,
    Unknown,
}

impl ChangeEvent {
    pub fn from_payload(payload: &str) -> Self {
        match payload.trim().to_uppercase().as_str() {
            "INSERT" => ChangeEvent::Insert,
            "UPDATE" => ChangeEvent::Update,
            "DELETE" => ChangeEvent::Delete,
            "TRUNCATE" => ChangeEvent::Truncate,
            _ => ChangeEvent::Unknown,
        }
    }
}

/// Stream of "the employees collection changed" signals.
///
/// Senders should use `try_send` on a small buffer: a full buffer already
/// guarantees one pending re-fetch, so extra signals can be dropped.
pub struct ChangeFeed {
    rx: mpsc::Receiver<ChangeEvent>,
    pump: Option<JoinHandle<()>>,
}

impl ChangeFeed {
    pub fn new(rx: mpsc::Receiver<ChangeEvent>) -> Self {
        Self { rx, pump: None }
    }

    /// Feed whose events are produced by a background task; the task is
    /// aborted when the feed is dropped.
    pub fn with_pump(rx: mpsc::Receiver<ChangeEvent>, pump: JoinHandle<()>) -> Self {
        Self { rx, pump: Some(pump) }
    }

    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Discards signals that are already queued and returns how many there were.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Validates, assigns an id and creation timestamp, and persists.
    async fn add(&self, employee: &NewEmployee) -> Result<EmployeeRecord, AppError>;

    /// Every record, newest first. Failures propagate.
    async fn fetch_all(&self) -> Result<Vec<EmployeeRecord>, AppError>;

    /// Deleting an id that does not exist is not an error.
    async fn delete_one(&self, id: i64) -> Result<(), AppError>;

    /// Deletes every listed id in one go and returns how many rows went away.
    async fn delete_many(&self, ids: &[i64]) -> Result<u64, AppError>;

    async fn clear_all(&self) -> Result<(), AppError>;

    /// Every record, newest first. A backend failure yields an empty list.
    async fn load_all(&self) -> Vec<EmployeeRecord> {
        match self.fetch_all().await {
            Ok(employees) => employees,
            Err(err) => {
                log::warn!("Loading employees from {} backend failed: {}", self.backend(), err);
                Vec::new()
            }
        }
    }

    /// Change notifications for the collection, if the backend pushes any.
    async fn listen(&self) -> Result<Option<ChangeFeed>, AppError> {
        Ok(None)
    }
}

pub async fn open_store(config: &Config) -> Result<Arc<dyn RecordStore>, AppError> {
    log::info!("Opening {} employee store", config.backend);
    let store: Arc<dyn RecordStore> = match config.backend {
        BackendKind::Sql => Arc::new(SqlStore::open(&config.database_url()?, config.max_connections).await?),
        BackendKind::KeyValue => Arc::new(KeyValueStore::open(&config.kv_path).await?),
        BackendKind::Hosted => {
            Arc::new(HostedStore::connect(&config.database_url()?, config.max_connections).await?)
        }
    };
    Ok(store)
}

/// Orders records newest first; ties on the timestamp go to the higher id.
pub(crate) fn sort_newest_first(employees: &mut [EmployeeRecord]) {
    employees.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}
