use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Job Definition Models
// ============================================================================

/// Lifecycle status of a job definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Queued,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(JobStatus::Queued),
            "COMPLETED" => Ok(JobStatus::Completed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// JobDefinition describes one ETL task: source relation, paging, transform and trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDefinition {
    pub id: i64,
    pub job_name: String,
    pub cron_expression: Option<String>,
    pub enabled: bool,
    pub input_table_name: Option<String>,
    pub output_transformer_spec: Option<String>,
    pub page_size: i32,
    pub status: JobStatus,
}

impl JobDefinition {
    /// Eligible iff queued, enabled and naming a source relation
    pub fn is_eligible(&self) -> bool {
        self.status == JobStatus::Queued
            && self.enabled
            && self
                .input_table_name
                .as_deref()
                .is_some_and(|name| !name.trim().is_empty())
    }

    /// The cron expression, if one is set and non-blank
    pub fn cron(&self) -> Option<&str> {
        self.cron_expression
            .as_deref()
            .map(str::trim)
            .filter(|expr| !expr.is_empty())
    }

    /// Fingerprint of everything a registered trigger depends on.
    ///
    /// Two scans producing the same fingerprint for an id leave the trigger alone.
    pub fn trigger_fingerprint(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.job_name,
            self.cron().unwrap_or_default(),
            self.input_table_name.as_deref().unwrap_or_default(),
            self.page_size,
            self.output_transformer_spec.as_deref().unwrap_or_default(),
        )
    }
}

// ============================================================================
// Run Models
// ============================================================================

/// One processed source row, projected into the sink relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub request: String,
    pub response: String,
    pub time_taken_millis: i64,
}

/// Outcome of processing one source row
#[derive(Debug)]
pub enum RecordOutcome {
    Completed(ResultRecord),
    Failed {
        request: String,
        error: crate::errors::ExecutionError,
    },
}

/// Summary of a finished read/dispatch loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub job_id: i64,
    pub job_name: String,
    pub sink_name: String,
    pub pages_read: u64,
    pub records_processed: u64,
    pub records_failed: u64,
    pub batches_dispatched: u64,
}
