// Error handling framework
// One thiserror enum per concern, folded into ExecutionError at the run boundary

use thiserror::Error;

/// Transform spec and transform input errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// The spec text is not a JSON array of operation objects
    #[error("Unable to parse transform spec: {0}")]
    SpecParse(String),

    /// The spec parsed but an operation's parameters are unusable
    #[error("Invalid '{operation}' spec: {reason}")]
    InvalidSpec { operation: String, reason: String },

    #[error("Invalid transform input: {0}")]
    InvalidInput(String),
}

/// Outbound call errors raised by the request builder and legacy client
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Invalid call envelope: {0}")]
    InvalidEnvelope(String),

    #[error("No baseUrl in envelope and no default base URL configured")]
    MissingBaseUrl,

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Not enough variable values available to expand '{0}'")]
    MissingUriVariable(String),

    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Failed to serialize request body: {0}")]
    BodySerialization(String),

    #[error("HTTP client initialization failed: {0}")]
    ClientInit(String),

    /// Transport failure or non-2xx response from the external endpoint
    #[error("External call failed: {0}")]
    External(String),
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Tabular store and job-definition store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create sink relation '{table}': {reason}")]
    SinkCreation { table: String, reason: String },

    #[error("Store I/O failed: {0}")]
    StoreIo(String),

    #[error("Invalid relation name '{0}'")]
    InvalidIdentifier(String),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

/// Failure of a single job run
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Invalid job definition: {0}")]
    InvalidJobDefinition(String),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Batch write task failed: {0}")]
    WriteTaskFailed(String),
}

impl ExecutionError {
    /// Short, stable label used as a metrics dimension
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::InvalidJobDefinition(_) => "invalid_definition",
            ExecutionError::Transform(_) => "spec_parse",
            ExecutionError::Call(_) => "external_call",
            ExecutionError::Store(StoreError::SinkCreation { .. }) => "sink_creation",
            ExecutionError::Store(_) => "store_io",
            ExecutionError::WriteTaskFailed(_) => "write_task",
        }
    }
}

/// Schedule-related errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("No next execution time available for cron '{0}'")]
    NoNextExecution(String),
}

/// Scheduler scan errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Failed to load job definitions: {0}")]
    Load(#[from] StoreError),

    #[error("{} run-once job(s) failed: {}", .0.len(), summarize(.0))]
    RunsFailed(Vec<FailedRun>),
}

/// A run-once job whose synchronous execution failed during a scan
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailedRun {
    pub job_id: i64,
    pub job_name: String,
    pub error: String,
}

fn summarize(failures: &[FailedRun]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({}): {}", f.job_name, f.job_id, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// API response error type for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<TransformError> for ApiError {
    fn from(err: TransformError) -> Self {
        ApiError::new("TRANSFORM_ERROR", err.to_string())
    }
}

impl From<CallError> for ApiError {
    fn from(err: CallError) -> Self {
        ApiError::new("CALL_ERROR", err.to_string())
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::RunsFailed(failures) => {
                let details = serde_json::to_value(&failures).unwrap_or_default();
                ApiError::new(
                    "SCHEDULER_ERROR",
                    SchedulerError::RunsFailed(failures).to_string(),
                )
                .with_details(details)
            }
            other => ApiError::new("SCHEDULER_ERROR", other.to_string()),
        }
    }
}

// Implement From for common external errors
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => DatabaseError::DuplicateKey(db_err.message().to_string()),
                        _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::StoreIo(DatabaseError::from(err).to_string())
    }
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        StoreError::StoreIo(err.to_string())
    }
}

impl From<serde_json::Error> for TransformError {
    fn from(err: serde_json::Error) -> Self {
        TransformError::InvalidInput(err.to_string())
    }
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        CallError::External(err.to_string())
    }
}
