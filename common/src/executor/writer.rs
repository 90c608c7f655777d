// Asynchronous batch writer bounded by a semaphore

use crate::db::TabularStore;
use crate::errors::{ExecutionError, StoreError};
use crate::models::ResultRecord;
use crate::telemetry;
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Totals for a run's writes once they have all landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteReport {
    pub batches: usize,
    pub rows_written: u64,
}

/// Completion handle for the batch writes one run dispatched.
///
/// Dropping it detaches the writes; they still run to completion.
#[derive(Debug, Default)]
pub struct PendingWrites {
    handles: Vec<JoinHandle<Result<u64, StoreError>>>,
    outstanding: Arc<AtomicUsize>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of batches handed to the writer
    pub fn dispatched(&self) -> usize {
        self.handles.len()
    }

    /// Number of batches not yet written (or failed)
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Wait for every dispatched batch; fails if any batch failed
    pub async fn wait(self) -> Result<WriteReport, ExecutionError> {
        let batches = self.handles.len();
        let results = join_all(self.handles).await;

        let mut rows_written = 0;
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(Ok(rows)) => rows_written += rows,
                Ok(Err(e)) => failures.push(e.to_string()),
                Err(e) => failures.push(format!("write task aborted: {}", e)),
            }
        }

        if !failures.is_empty() {
            return Err(ExecutionError::WriteTaskFailed(format!(
                "{} of {} batch writes failed: {}",
                failures.len(),
                batches,
                failures.join("; ")
            )));
        }

        Ok(WriteReport {
            batches,
            rows_written,
        })
    }
}

/// BatchWriter hands result batches to spawned insert tasks
#[derive(Clone)]
pub struct BatchWriter {
    store: Arc<dyn TabularStore>,
    permits: Arc<Semaphore>,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn TabularStore>, max_concurrent_writes: usize) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(max_concurrent_writes.max(1))),
        }
    }

    /// Spawn an insert for `records`, waiting only for a write permit
    pub async fn dispatch(
        &self,
        table: &str,
        records: Vec<ResultRecord>,
        pending: &mut PendingWrites,
    ) -> Result<(), ExecutionError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ExecutionError::WriteTaskFailed(e.to_string()))?;

        let store = self.store.clone();
        let table = table.to_string();
        let outstanding = pending.outstanding.clone();
        outstanding.fetch_add(1, Ordering::SeqCst);

        let handle = tokio::spawn(async move {
            let _permit = permit;
            let result = store.insert_batch(&table, &records).await;
            match &result {
                Ok(rows) => {
                    telemetry::record_batch_write("success");
                    debug!(table = %table, rows = rows, "Batch written");
                }
                Err(e) => {
                    telemetry::record_batch_write("failure");
                    error!(table = %table, records = records.len(), error = %e, "Batch write failed");
                }
            }
            outstanding.fetch_sub(1, Ordering::SeqCst);
            result
        });

        pending.handles.push(handle);
        Ok(())
    }
}
