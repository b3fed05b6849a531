use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::db::{BackendKind, ChangeEvent, ChangeFeed, RecordStore};
use crate::errors::AppError;
use crate::models::employee::{now_timestamp, EmployeeRecord, NewEmployee};

/// Channel the `employees_notify_change` trigger publishes on.
pub const CHANGE_CHANNEL: &str = "employees_changes";

// One queued signal is enough to guarantee a pending re-fetch
const FEED_BUFFER: usize = 1;
const LISTENER_RETRY: Duration = Duration::from_secs(1);

/// Employee records in a hosted PostgreSQL database. The schema, unique
/// constraint and notify trigger come from `migrations/postgres`.
pub struct HostedStore {
    pool: PgPool,
}

impl HostedStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(AppError::from_sqlx)?;
        log::info!("Connected to hosted employee database");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for HostedStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Hosted
    }

    async fn add(&self, employee: &NewEmployee) -> Result<EmployeeRecord, AppError> {
        let employee = employee.normalized()?;
        log::debug!("Adding employee {:?} to hosted store", employee.key());

        // Check if the employee already exists. Not atomic with the insert;
        // the unique constraint catches the race and maps to the same error.
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM employees WHERE name = $1 AND designation = $2 AND department = $3)",
        )
        .bind(&employee.name)
        .bind(&employee.designation)
        .bind(&employee.department)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from_sqlx)?;

        if exists {
            return Err(AppError::DuplicateRecord);
        }

        let record = sqlx::query_as::<_, EmployeeRecord>(
            "INSERT INTO employees (name, designation, department, photo_url, created_at) VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, name, designation, department, photo_url, created_at, updated_at",
        )
        .bind(&employee.name)
        .bind(&employee.designation)
        .bind(&employee.department)
        .bind(&employee.photo_url)
        .bind(now_timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from_sqlx)?;

        log::info!("Employee added with ID: {}", record.id);
        Ok(record)
    }

    async fn fetch_all(&self) -> Result<Vec<EmployeeRecord>, AppError> {
        let employees = sqlx::query_as::<_, EmployeeRecord>(
            "SELECT id, name, designation, department, photo_url, created_at, updated_at FROM employees ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from_sqlx)?;
        log::debug!("Loaded {} employees from hosted store", employees.len());
        Ok(employees)
    }

    async fn delete_one(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM employees WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from_sqlx)?;
        log::debug!("Employee {} deleted", id);
        Ok(())
    }

    async fn delete_many(&self, ids: &[i64]) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM employees WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(AppError::from_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn clear_all(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM employees")
            .execute(&self.pool)
            .await
            .map_err(AppError::from_sqlx)?;
        log::info!("All employees deleted");
        Ok(())
    }

    async fn listen(&self) -> Result<Option<ChangeFeed>, AppError> {
        let mut listener = PgListener::connect_with(&self.pool).await.map_err(AppError::from_sqlx)?;
        listener.listen(CHANGE_CHANNEL).await.map_err(AppError::from_sqlx)?;
        log::info!("Listening for changes on '{}'", CHANGE_CHANNEL);

        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let pump = tokio::spawn(async move {
            loop {
                match listener.try_recv().await {
                    Ok(Some(notification)) => {
                        if !forward(&tx, ChangeEvent::from_payload(notification.payload())) {
                            break;
                        }
                    }
                    // Ok(None) is a dropped connection. Either way nothing was heard
                    // while it was down, so reconnect and force one re-fetch.
                    lost => {
                        if let Err(err) = lost {
                            log::warn!("Change listener error: {}", err);
                        } else {
                            log::warn!("Change listener lost its connection, reconnecting");
                        }
                        if !reconnect(&mut listener, &tx).await || !forward(&tx, ChangeEvent::Unknown) {
                            break;
                        }
                        log::info!("Change listener reconnected to '{}'", CHANGE_CHANNEL);
                    }
                }
            }
            log::debug!("Change listener on '{}' stopped", CHANGE_CHANNEL);
        });

        Ok(Some(ChangeFeed::with_pump(rx, pump)))
    }
}

/// Queues `event` for the subscriber. Returns false once nobody is listening.
fn forward(tx: &mpsc::Sender<ChangeEvent>, event: ChangeEvent) -> bool {
    match tx.try_send(event) {
        // A full buffer already holds a pending re-fetch
        Ok(()) | Err(TrySendError::Full(_)) => true,
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Retries until the listener holds a connection again. Any query on the
/// listener reconnects it and re-issues its LISTEN statements.
async fn reconnect(listener: &mut PgListener, tx: &mpsc::Sender<ChangeEvent>) -> bool {
    loop {
        match sqlx::query("SELECT 1").execute(&mut *listener).await {
            Ok(_) => return true,
            Err(err) => {
                log::warn!("Change listener reconnect failed: {}", err);
                if tx.is_closed() {
                    return false;
                }
                tokio::time::sleep(LISTENER_RETRY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_keeps_one_pending_signal() {
        let (tx, mut rx) = mpsc::channel(FEED_BUFFER);
        assert!(forward(&tx, ChangeEvent::Insert));
        assert!(forward(&tx, ChangeEvent::Unknown));
        assert_eq!(rx.try_recv().unwrap(), ChangeEvent::Insert);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn forward_stops_when_subscriber_is_gone() {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        drop(rx);
        assert!(!forward(&tx, ChangeEvent::Unknown));
    }
}
