//! Best-effort execution history.
//!
//! Each completed run is persisted by a detached task. Failures are logged
//! and sent on the logger's own error channel; they never reach the editor
//! session's state.

use std::sync::{Arc, Mutex};

use futures::future::join_all;
use shared_types::NewExecutionRecord;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::{DataStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Failed to log execution: {0}")]
    Store(#[from] StoreError),

    #[error("History task aborted: {0}")]
    Aborted(String),
}

pub struct HistoryLogger {
    store: Arc<dyn DataStore>,
    errors_tx: mpsc::UnboundedSender<HistoryError>,
    errors_rx: Mutex<Option<mpsc::UnboundedReceiver<HistoryError>>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl HistoryLogger {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        Self {
            store,
            errors_tx,
            errors_rx: Mutex::new(Some(errors_rx)),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Take the receiving end of the error channel. Only the first caller
    /// gets it.
    pub fn take_errors(&self) -> Option<mpsc::UnboundedReceiver<HistoryError>> {
        self.errors_rx
            .lock()
            .expect("HistoryLogger lock poisoned")
            .take()
    }

    /// Persist `record` in the background. Returns immediately.
    pub fn record(&self, record: NewExecutionRecord) {
        let store = self.store.clone();
        let errors = self.errors_tx.clone();
        let handle = tokio::spawn(async move {
            let language = record.language;
            match store.insert_execution(record).await {
                Ok(saved) => debug!(id = saved.id, %language, "Execution logged"),
                Err(e) => {
                    warn!(error = %e, %language, "Failed to log execution");
                    let _ = errors.send(HistoryError::Store(e));
                }
            }
        });

        let mut pending = self.pending.lock().expect("HistoryLogger lock poisoned");
        pending.retain(|task| !task.is_finished());
        pending.push(handle);
    }

    /// Wait for every task spawned so far.
    pub async fn flush(&self) {
        let tasks = std::mem::take(&mut *self.pending.lock().expect("HistoryLogger lock poisoned"));
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Execution history task did not complete");
                let _ = self.errors_tx.send(HistoryError::Aborted(e.to_string()));
            }
        }
    }
}
