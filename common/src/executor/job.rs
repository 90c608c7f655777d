// Paginated job executor
// CREATE_SINK -> {READ_PAGE -> DISPATCH_PAGE}* -> DONE

use crate::client::RequestInvoker;
use crate::config::{ExecutorSettings, RecordFailurePolicy};
use crate::db::{quote_identifier, TabularStore};
use crate::errors::ExecutionError;
use crate::executor::writer::{BatchWriter, PendingWrites};
use crate::executor::JobRunner;
use crate::models::{JobDefinition, RecordOutcome, ResultRecord, RunSummary};
use crate::telemetry;
use crate::transform::Chain;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_concurrent_writes: usize,
    pub record_failure_policy: RecordFailurePolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_writes: 4,
            record_failure_policy: RecordFailurePolicy::Abort,
        }
    }
}

impl From<&ExecutorSettings> for ExecutorConfig {
    fn from(settings: &ExecutorSettings) -> Self {
        Self {
            max_concurrent_writes: settings.max_concurrent_writes,
            record_failure_policy: settings.record_failure_policy,
        }
    }
}

/// Result of a run whose pages were all read and dispatched
#[derive(Debug)]
pub struct JobRun {
    pub summary: RunSummary,
    /// Completion handle for the run's batch inserts
    pub writes: PendingWrites,
}

/// JobExecutor streams a source relation through call + transform into a sink
pub struct JobExecutor {
    store: Arc<dyn TabularStore>,
    invoker: Arc<dyn RequestInvoker>,
    writer: BatchWriter,
    config: ExecutorConfig,
}

/// Sink relation name: `<input>_batch_output_<yyyyMMddHHmmss>`
pub fn sink_name(input_table: &str, at: DateTime<Utc>) -> String {
    format!("{}_batch_output_{}", input_table, at.format("%Y%m%d%H%M%S"))
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn TabularStore>,
        invoker: Arc<dyn RequestInvoker>,
        config: ExecutorConfig,
    ) -> Self {
        let writer = BatchWriter::new(store.clone(), config.max_concurrent_writes);
        Self {
            store,
            invoker,
            writer,
            config,
        }
    }

    /// Run a job definition to the point where every page has been dispatched
    #[instrument(
        skip(self, definition),
        fields(
            job_id = definition.id,
            job_name = %definition.job_name,
            run_id = %uuid::Uuid::new_v4()
        )
    )]
    pub async fn execute(&self, definition: &JobDefinition) -> Result<JobRun, ExecutionError> {
        let result = self.execute_inner(definition).await;
        match &result {
            Ok(run) => {
                telemetry::record_job_run(&definition.job_name, "success");
                info!(
                    sink = %run.summary.sink_name,
                    pages = run.summary.pages_read,
                    processed = run.summary.records_processed,
                    failed = run.summary.records_failed,
                    "Finished job"
                );
            }
            Err(e) => {
                telemetry::record_job_run(&definition.job_name, "failure");
                error!(error = %e, kind = e.kind(), "Job run failed");
            }
        }
        result
    }

    async fn execute_inner(&self, definition: &JobDefinition) -> Result<JobRun, ExecutionError> {
        let input_table = definition
            .input_table_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                ExecutionError::InvalidJobDefinition("inputTableName is required".to_string())
            })?;
        if definition.page_size <= 0 {
            return Err(ExecutionError::InvalidJobDefinition(format!(
                "pageSize must be positive, got {}",
                definition.page_size
            )));
        }
        quote_identifier(input_table)?;

        // compile up front so a bad spec fails before the sink exists
        let chain = match definition.output_transformer_spec.as_deref().map(str::trim) {
            Some(spec) if !spec.is_empty() => Some(Chain::from_spec_str(spec)?),
            _ => None,
        };

        info!(input_table = %input_table, page_size = definition.page_size, "Running job");

        let sink = sink_name(input_table, Utc::now());
        self.store.create_sink(&sink).await?;

        let page_size = i64::from(definition.page_size);
        let mut summary = RunSummary {
            job_id: definition.id,
            job_name: definition.job_name.clone(),
            sink_name: sink.clone(),
            pages_read: 0,
            records_processed: 0,
            records_failed: 0,
            batches_dispatched: 0,
        };
        let mut writes = PendingWrites::new();
        let mut page_number: i64 = 0;

        loop {
            let rows = self
                .store
                .read_page(input_table, page_size, page_number * page_size)
                .await?;
            summary.pages_read += 1;
            let row_count = rows.len();

            let mut batch = Vec::with_capacity(row_count);
            for request in rows {
                match self.process_record(&definition.job_name, chain.as_ref(), request).await {
                    RecordOutcome::Completed(record) => {
                        summary.records_processed += 1;
                        batch.push(record);
                    }
                    RecordOutcome::Failed { request, error } => {
                        summary.records_failed += 1;
                        telemetry::record_record_failed(&definition.job_name, error.kind());

                        match self.config.record_failure_policy {
                            RecordFailurePolicy::Abort => {
                                if !batch.is_empty() {
                                    self.writer.dispatch(&sink, batch, &mut writes).await?;
                                }
                                return Err(error);
                            }
                            RecordFailurePolicy::Skip => {
                                warn!(error = %error, request = %request, "Skipping failed record");
                            }
                        }
                    }
                }
            }

            if !batch.is_empty() {
                self.writer.dispatch(&sink, batch, &mut writes).await?;
                summary.batches_dispatched += 1;
            }

            // a short or empty page is the last one
            if (row_count as i64) < page_size {
                break;
            }
            page_number += 1;
        }

        Ok(JobRun { summary, writes })
    }

    async fn process_record(
        &self,
        job_name: &str,
        chain: Option<&Chain>,
        request: String,
    ) -> RecordOutcome {
        let started = Instant::now();
        let response = match self.invoker.invoke(&request).await {
            Ok(response) => response,
            Err(e) => {
                return RecordOutcome::Failed {
                    request,
                    error: e.into(),
                }
            }
        };
        let elapsed = started.elapsed();
        telemetry::record_record_processed(job_name, elapsed.as_secs_f64());

        let response = match chain {
            Some(chain) => match chain.transform_str(&response) {
                Ok(transformed) => transformed,
                Err(e) => {
                    return RecordOutcome::Failed {
                        request,
                        error: e.into(),
                    }
                }
            },
            None => response,
        };

        RecordOutcome::Completed(ResultRecord {
            request,
            response,
            time_taken_millis: i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
        })
    }
}

#[async_trait]
impl JobRunner for JobExecutor {
    async fn run(&self, definition: &JobDefinition) -> Result<JobRun, ExecutionError> {
        self.execute(definition).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sink_name_format() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            sink_name("orders", at),
            "orders_batch_output_20250309070501"
        );
    }

    #[test]
    fn test_config_from_settings() {
        let settings = ExecutorSettings {
            max_concurrent_writes: 2,
            record_failure_policy: RecordFailurePolicy::Skip,
            wait_for_writes: true,
        };
        let config = ExecutorConfig::from(&settings);
        assert_eq!(config.max_concurrent_writes, 2);
        assert_eq!(config.record_failure_policy, RecordFailurePolicy::Skip);
    }
}
