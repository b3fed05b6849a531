use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::db::{sort_newest_first, BackendKind, RecordStore};
use crate::errors::AppError;
use crate::models::employee::{now_timestamp, EmployeeRecord, NewEmployee};

/// Everything the store persists, kept as one JSON document.
#[derive(Serialize, Deserialize, Debug, Default)]
struct Document {
    next_id: i64,
    employees: Vec<EmployeeRecord>,
}

/// Employee records in a single JSON file on local disk, read and rewritten
/// whole on every operation. Uniqueness of the employee triple is not enforced.
pub struct KeyValueStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl KeyValueStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| AppError::BackendUnavailable(format!("{}: {}", parent.display(), err)))?;
        }

        let store = Self { path, lock: Mutex::new(()) };
        // Surface a corrupt document at startup instead of on first read
        store.read().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Document, AppError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Document::default()),
            Err(err) => {
                return Err(AppError::BackendUnavailable(format!("{}: {}", self.path.display(), err)))
            }
        };
        serde_json::from_slice(&bytes).map_err(|err| {
            AppError::BackendUnavailable(format!("{} is not a valid employee document: {}", self.path.display(), err))
        })
    }

    async fn write(&self, document: &Document) -> Result<(), AppError> {
        let bytes = serde_json::to_vec_pretty(document).map_err(|err| AppError::Internal(err.to_string()))?;

        // Write beside the target and rename so readers never see half a document
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|err| AppError::BackendUnavailable(format!("{}: {}", tmp.display(), err)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| AppError::BackendUnavailable(format!("{}: {}", self.path.display(), err)))
    }
}

#[async_trait]
impl RecordStore for KeyValueStore {
    fn backend(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    async fn add(&self, employee: &NewEmployee) -> Result<EmployeeRecord, AppError> {
        let employee = employee.normalized()?;
        let _guard = self.lock.lock().await;

        let mut document = self.read().await?;
        let id = document
            .employees
            .iter()
            .map(|e| e.id)
            .max()
            .unwrap_or(0)
            .max(document.next_id - 1)
            + 1;
        document.next_id = id + 1;

        let record = employee.into_record(id, now_timestamp());
        document.employees.push(record.clone());
        self.write(&document).await?;

        log::debug!("Employee added to {} with ID: {}", self.path.display(), id);
        Ok(record)
    }

    async fn fetch_all(&self) -> Result<Vec<EmployeeRecord>, AppError> {
        let mut employees = self.read().await?.employees;
        sort_newest_first(&mut employees);
        Ok(employees)
    }

    async fn delete_one(&self, id: i64) -> Result<(), AppError> {
        self.delete_many(&[id]).await.map(|_| ())
    }

    async fn delete_many(&self, ids: &[i64]) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock.lock().await;

        let mut document = self.read().await?;
        let before = document.employees.len();
        document.employees.retain(|e| !ids.contains(&e.id));
        let removed = (before - document.employees.len()) as u64;

        if removed > 0 {
            self.write(&document).await?;
        }
        log::debug!("Deleted {} employees from {}", removed, self.path.display());
        Ok(removed)
    }

    async fn clear_all(&self) -> Result<(), AppError> {
        let _guard = self.lock.lock().await;

        let mut document = self.read().await?;
        document.employees.clear();
        self.write(&document).await?;
        log::info!("All employees deleted from {}", self.path.display());
        Ok(())
    }
}
