use std::sync::Arc;

use common::client::{LegacyClient, RestClient};
use common::config::Settings;
use common::db::DbPool;
use common::scheduler::TriggerScheduler;
use common::transform::JsonTransformer;
use metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub scheduler: Arc<TriggerScheduler>,
    pub rest_client: RestClient,
    pub legacy_client: LegacyClient,
    pub transformer: JsonTransformer,
    /// Absent when the API runs without a database (tests)
    pub db_pool: Option<DbPool>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new AppState instance
    pub fn new(
        config: Settings,
        scheduler: Arc<TriggerScheduler>,
        rest_client: RestClient,
        legacy_client: LegacyClient,
    ) -> Self {
        Self {
            config: Arc::new(config),
            scheduler,
            rest_client,
            legacy_client,
            transformer: JsonTransformer::new(),
            db_pool: None,
            metrics_handle: None,
        }
    }

    pub fn with_db_pool(mut self, db_pool: DbPool) -> Self {
        self.db_pool = Some(db_pool);
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
