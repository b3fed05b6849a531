//! Keeps an in-memory snapshot of the directory in step with its store.
//!
//! Two producers write the snapshot: the caller, which re-fetches after each
//! of its own mutations, and the change subscription, which re-fetches when
//! the backend reports a change. Both always publish a complete list, so the
//! last one to land wins and nothing is ever merged.

pub mod dedup;

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::RecordStore;
use crate::errors::AppError;
use crate::models::employee::{DedupReport, EmployeeRecord, NewEmployee};

pub use dedup::{duplicate_ids, remove_duplicates};

/// Handle for a running change subscription. Dropping it also stops delivery.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.task.abort();
        log::info!("Change subscription released");
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Calls `callback` with a fresh `load_all()` whenever the store reports a
/// change. Signals that pile up while a re-fetch is running are folded into
/// the next one. Returns `None` for backends without change notifications.
pub async fn subscribe_to_changes<F>(
    store: Arc<dyn RecordStore>,
    callback: F,
) -> Result<Option<Subscription>, AppError>
where
    F: Fn(Vec<EmployeeRecord>) + Send + Sync + 'static,
{
    let Some(mut feed) = store.listen().await? else {
        log::debug!("{} backend does not push changes", store.backend());
        return Ok(None);
    };

    let task = tokio::spawn(async move {
        while let Some(event) = feed.next().await {
            let coalesced = feed.drain();
            log::debug!("Change received ({:?}, {} more coalesced), reloading employees", event, coalesced);
            callback(store.load_all().await);
        }
        log::debug!("Change feed closed");
    });

    Ok(Some(Subscription { task }))
}

pub struct Synchronizer {
    store: Arc<dyn RecordStore>,
    snapshot: Arc<watch::Sender<Vec<EmployeeRecord>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl Synchronizer {
    /// Seeds the snapshot with one `load_all()` and, when the backend pushes
    /// changes, subscribes so every change replaces the snapshot. A live
    /// subscription is followed by one more load to cover the gap between
    /// the seed and the first signal.
    ///
    /// A failed subscription is logged and the synchronizer carries on with
    /// caller-triggered refreshes only.
    pub async fn start(store: Arc<dyn RecordStore>) -> Self {
        let initial = store.load_all().await;
        log::info!("Loaded {} employees from {} backend", initial.len(), store.backend());

        let (snapshot, _) = watch::channel(initial);
        let snapshot = Arc::new(snapshot);

        let publisher = Arc::clone(&snapshot);
        let subscription = match subscribe_to_changes(Arc::clone(&store), move |employees| {
            publisher.send_replace(employees);
        })
        .await
        {
            // Anything committed between the seed and the subscription
            // produced no signal, so load once more now that one is open.
            Ok(Some(subscription)) => {
                let employees = store.load_all().await;
                snapshot.send_replace(employees);
                Some(subscription)
            }
            Ok(None) => None,
            Err(err) => {
                log::warn!("Live updates unavailable: {}", err);
                None
            }
        };

        Self {
            store,
            snapshot,
            subscription: Mutex::new(subscription),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Most recent full list.
    pub fn snapshot(&self) -> Vec<EmployeeRecord> {
        self.snapshot.borrow().clone()
    }

    /// Receiver that is notified each time a new snapshot is published.
    pub fn watch(&self) -> watch::Receiver<Vec<EmployeeRecord>> {
        self.snapshot.subscribe()
    }

    pub fn is_live(&self) -> bool {
        self.subscription
            .lock()
            .map(|guard| guard.as_ref().map_or(false, Subscription::is_active))
            .unwrap_or(false)
    }

    /// Re-fetches the whole list and publishes it.
    pub async fn refresh(&self) -> Vec<EmployeeRecord> {
        let employees = self.store.load_all().await;
        self.snapshot.send_replace(employees.clone());
        employees
    }

    pub async fn add(&self, employee: &NewEmployee) -> Result<EmployeeRecord, AppError> {
        let record = self.store.add(employee).await?;
        self.refresh().await;
        Ok(record)
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        self.store.delete_one(id).await?;
        self.refresh().await;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        self.store.clear_all().await?;
        self.refresh().await;
        Ok(())
    }

    pub async fn remove_duplicates(&self) -> Result<DedupReport, AppError> {
        let report = remove_duplicates(self.store.as_ref()).await?;
        if report.removed > 0 {
            self.refresh().await;
        }
        Ok(report)
    }

    /// Stops receiving change notifications. Safe to call more than once.
    pub fn shutdown(&self) {
        let subscription = match self.subscription.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
    }
}
