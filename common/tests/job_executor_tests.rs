// Tests for the paginated job executor against in-memory store and invoker doubles

use async_trait::async_trait;
use common::client::RequestInvoker;
use common::config::RecordFailurePolicy;
use common::db::TabularStore;
use common::errors::{CallError, ExecutionError, StoreError, TransformError};
use common::executor::{ExecutorConfig, JobExecutor, JobRunner};
use common::models::{JobDefinition, JobStatus, ResultRecord};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory tabular store recording every call made against it
#[derive(Default)]
struct MemoryStore {
    rows: Vec<String>,
    insert_delay: Option<Duration>,
    fail_inserts: bool,
    reads: Mutex<Vec<(i64, i64)>>,
    sinks: Mutex<Vec<String>>,
    written: Mutex<Vec<ResultRecord>>,
    active_inserts: AtomicUsize,
    peak_inserts: AtomicUsize,
}

impl MemoryStore {
    fn with_rows(count: usize) -> Self {
        Self {
            rows: (0..count).map(|i| format!(r#"{{"row":{}}}"#, i)).collect(),
            ..Default::default()
        }
    }

    fn read_count(&self) -> usize {
        self.reads.lock().unwrap().len()
    }

    fn written(&self) -> Vec<ResultRecord> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl TabularStore for MemoryStore {
    async fn create_sink(&self, table: &str) -> Result<(), StoreError> {
        self.sinks.lock().unwrap().push(table.to_string());
        Ok(())
    }

    async fn read_page(&self, _table: &str, limit: i64, offset: i64) -> Result<Vec<String>, StoreError> {
        self.reads.lock().unwrap().push((limit, offset));
        Ok(self
            .rows
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn insert_batch(&self, _table: &str, records: &[ResultRecord]) -> Result<u64, StoreError> {
        let active = self.active_inserts.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_inserts.fetch_max(active, Ordering::SeqCst);
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        self.active_inserts.fetch_sub(1, Ordering::SeqCst);

        if self.fail_inserts {
            return Err(StoreError::StoreIo("disk full".to_string()));
        }
        self.written.lock().unwrap().extend_from_slice(records);
        Ok(records.len() as u64)
    }
}

/// Invoker that answers every envelope with a fixed JSON body, failing on marked rows
struct StubInvoker {
    response: String,
    fail_marker: Option<String>,
    calls: AtomicUsize,
}

impl StubInvoker {
    fn responding(response: &str) -> Self {
        Self {
            response: response.to_string(),
            fail_marker: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing_on(response: &str, marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::responding(response)
        }
    }
}

#[async_trait]
impl RequestInvoker for StubInvoker {
    async fn invoke(&self, envelope_json: &str) -> Result<String, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.fail_marker {
            if envelope_json.contains(marker.as_str()) {
                return Err(CallError::External("503 Service Unavailable".to_string()));
            }
        }
        Ok(self.response.clone())
    }
}

fn definition(page_size: i32, spec: Option<&str>) -> JobDefinition {
    JobDefinition {
        id: 1,
        job_name: "ratings".to_string(),
        cron_expression: None,
        enabled: true,
        input_table_name: Some("ratings_in".to_string()),
        output_transformer_spec: spec.map(str::to_string),
        page_size,
        status: JobStatus::Queued,
    }
}

fn executor(
    store: Arc<MemoryStore>,
    invoker: Arc<StubInvoker>,
    policy: RecordFailurePolicy,
) -> JobExecutor {
    JobExecutor::new(
        store,
        invoker,
        ExecutorConfig {
            max_concurrent_writes: 2,
            record_failure_policy: policy,
        },
    )
}

#[tokio::test]
async fn test_single_row_job_writes_transformed_response() {
    let store = Arc::new(MemoryStore {
        rows: vec![r#"{"baseUrl":"http://svc","path":"/rating/1"}"#.to_string()],
        ..Default::default()
    });
    let invoker = Arc::new(StubInvoker::responding(
        r#"{"rating":{"primary":{"value":3}}}"#,
    ));
    let spec = r#"[{"operation":"shift","spec":{"rating":{"primary":{"value":"Rating"}}}}]"#;

    let run = executor(store.clone(), invoker.clone(), RecordFailurePolicy::Abort)
        .run(&definition(100, Some(spec)))
        .await
        .unwrap();

    assert_eq!(run.summary.pages_read, 1);
    assert_eq!(run.summary.records_processed, 1);
    assert_eq!(run.summary.batches_dispatched, 1);
    assert!(run.summary.sink_name.starts_with("ratings_in_batch_output_"));

    let report = run.writes.wait().await.unwrap();
    assert_eq!(report.rows_written, 1);

    let written = store.written();
    assert_eq!(written[0].request, r#"{"baseUrl":"http://svc","path":"/rating/1"}"#);
    assert_eq!(written[0].response, r#"{"Rating":3}"#);
    assert!(written[0].time_taken_millis >= 0);
    assert_eq!(store.sinks.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_blank_spec_passes_response_through() {
    let store = Arc::new(MemoryStore::with_rows(1));
    let invoker = Arc::new(StubInvoker::responding("raw body, not json"));

    let run = executor(store.clone(), invoker, RecordFailurePolicy::Abort)
        .run(&definition(10, Some("   ")))
        .await
        .unwrap();
    run.writes.wait().await.unwrap();

    assert_eq!(store.written()[0].response, "raw body, not json");
}

#[tokio::test]
async fn test_empty_source_reads_once_and_writes_nothing() {
    let store = Arc::new(MemoryStore::default());
    let invoker = Arc::new(StubInvoker::responding("{}"));

    let run = executor(store.clone(), invoker.clone(), RecordFailurePolicy::Abort)
        .run(&definition(50, None))
        .await
        .unwrap();

    assert_eq!(store.read_count(), 1);
    assert_eq!(run.summary.batches_dispatched, 0);
    assert_eq!(run.writes.dispatched(), 0);
    assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
    // the sink is created even when there is nothing to write
    assert_eq!(store.sinks.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_pages_advance_by_offset() {
    let store = Arc::new(MemoryStore::with_rows(5));
    let invoker = Arc::new(StubInvoker::responding("{}"));

    let run = executor(store.clone(), invoker, RecordFailurePolicy::Abort)
        .run(&definition(2, None))
        .await
        .unwrap();
    run.writes.wait().await.unwrap();

    assert_eq!(
        *store.reads.lock().unwrap(),
        vec![(2, 0), (2, 2), (2, 4)]
    );
    assert_eq!(store.written().len(), 5);
}

#[tokio::test]
async fn test_invalid_spec_fails_before_sink_creation() {
    let store = Arc::new(MemoryStore::with_rows(3));
    let invoker = Arc::new(StubInvoker::responding("{}"));

    let err = executor(store.clone(), invoker, RecordFailurePolicy::Abort)
        .run(&definition(10, Some("invalid json")))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::Transform(TransformError::SpecParse(_))
    ));
    assert!(store.sinks.lock().unwrap().is_empty());
    assert_eq!(store.read_count(), 0);
}

#[tokio::test]
async fn test_non_positive_page_size_rejected() {
    let store = Arc::new(MemoryStore::with_rows(3));
    let invoker = Arc::new(StubInvoker::responding("{}"));

    let err = executor(store.clone(), invoker, RecordFailurePolicy::Abort)
        .run(&definition(0, None))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::InvalidJobDefinition(_)));
    assert!(store.sinks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_abort_policy_flushes_completed_records_then_fails() {
    let store = Arc::new(MemoryStore {
        rows: vec![
            r#"{"n":"a"}"#.to_string(),
            r#"{"n":"boom"}"#.to_string(),
            r#"{"n":"c"}"#.to_string(),
        ],
        ..Default::default()
    });
    let invoker = Arc::new(StubInvoker::failing_on("{}", "boom"));

    let err = executor(store.clone(), invoker.clone(), RecordFailurePolicy::Abort)
        .run(&definition(10, None))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::Call(CallError::External(_))));
    assert_eq!(invoker.calls.load(Ordering::SeqCst), 2);

    // the partial batch was dispatched detached; give it a moment to land
    for _ in 0..50 {
        if !store.written().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let written = store.written();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].request, r#"{"n":"a"}"#);
}

#[tokio::test]
async fn test_skip_policy_keeps_going() {
    let store = Arc::new(MemoryStore {
        rows: vec![
            r#"{"n":"a"}"#.to_string(),
            r#"{"n":"boom"}"#.to_string(),
            r#"{"n":"c"}"#.to_string(),
        ],
        ..Default::default()
    });
    let invoker = Arc::new(StubInvoker::failing_on("{}", "boom"));

    let run = executor(store.clone(), invoker, RecordFailurePolicy::Skip)
        .run(&definition(10, None))
        .await
        .unwrap();

    assert_eq!(run.summary.records_processed, 2);
    assert_eq!(run.summary.records_failed, 1);
    let report = run.writes.wait().await.unwrap();
    assert_eq!(report.rows_written, 2);
}

#[tokio::test]
async fn test_transform_failure_on_non_json_response() {
    let store = Arc::new(MemoryStore::with_rows(1));
    let invoker = Arc::new(StubInvoker::responding("<html>oops</html>"));
    let spec = r#"[{"operation":"shift","spec":{"a":"b"}}]"#;

    let err = executor(store, invoker, RecordFailurePolicy::Abort)
        .run(&definition(10, Some(spec)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::Transform(TransformError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_failed_batch_write_surfaces_on_wait() {
    let store = Arc::new(MemoryStore {
        fail_inserts: true,
        ..MemoryStore::with_rows(3)
    });
    let invoker = Arc::new(StubInvoker::responding("{}"));

    let run = executor(store, invoker, RecordFailurePolicy::Abort)
        .run(&definition(10, None))
        .await
        .unwrap();

    let err = run.writes.wait().await.unwrap_err();
    assert!(matches!(err, ExecutionError::WriteTaskFailed(ref m) if m.contains("disk full")));
}

#[tokio::test]
async fn test_concurrent_writes_stay_within_bound() {
    let store = Arc::new(MemoryStore {
        insert_delay: Some(Duration::from_millis(20)),
        ..MemoryStore::with_rows(12)
    });
    let invoker = Arc::new(StubInvoker::responding("{}"));

    let run = executor(store.clone(), invoker, RecordFailurePolicy::Abort)
        .run(&definition(2, None))
        .await
        .unwrap();
    let report = run.writes.wait().await.unwrap();

    assert_eq!(report.batches, 6);
    assert_eq!(report.rows_written, 12);
    assert!(store.peak_inserts.load(Ordering::SeqCst) <= 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A run over N rows with page size p reads floor(N/p) + 1 pages and writes every row once
    #[test]
    fn property_read_count_matches_paging(rows in 0usize..60, page_size in 1i32..12) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (reads, written, pages_read) = runtime.block_on(async {
            let store = Arc::new(MemoryStore::with_rows(rows));
            let invoker = Arc::new(StubInvoker::responding("{}"));
            let run = executor(store.clone(), invoker, RecordFailurePolicy::Abort)
                .run(&definition(page_size, None))
                .await
                .unwrap();
            let pages_read = run.summary.pages_read;
            run.writes.wait().await.unwrap();
            (store.read_count(), store.written().len(), pages_read)
        });

        let expected = rows / page_size as usize + 1;
        prop_assert_eq!(reads, expected);
        prop_assert_eq!(pages_read as usize, expected);
        prop_assert_eq!(written, rows);
    }
}
