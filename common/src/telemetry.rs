// Telemetry module for structured logging and metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging
///
/// `RUST_LOG` wins over the configured level. With `json` set, events are
/// emitted as JSON lines carrying the current span and span list; otherwise
/// the human-readable formatter is used.
#[tracing::instrument(skip_all)]
pub fn init_logging(log_level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let registry = tracing_subscriber::registry();

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(env_filter);
        registry
            .with(json_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        let text_layer = fmt::layer().with_target(true).with_filter(env_filter);
        registry
            .with(text_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(log_level = log_level, json = json, "Structured logging initialized");

    Ok(())
}

/// Install the Prometheus recorder and describe the engine's metrics
///
/// The returned handle renders the scrape text served at `/metrics`.
#[tracing::instrument(skip_all)]
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    describe_counter!("etl_job_runs_total", "Job runs by job name and outcome");
    describe_counter!(
        "etl_records_processed_total",
        "Source records turned into result records"
    );
    describe_counter!(
        "etl_records_failed_total",
        "Source records whose call or transform failed"
    );
    describe_histogram!(
        "etl_call_duration_seconds",
        "Latency of outbound calls made for source records"
    );
    describe_counter!("etl_batch_writes_total", "Batch inserts by outcome");
    describe_gauge!("etl_registered_triggers", "Currently registered cron triggers");

    tracing::info!("Prometheus metrics recorder installed");

    Ok(handle)
}

/// Record the end of a job run
#[inline]
pub fn record_job_run(job_name: &str, outcome: &'static str) {
    counter!(
        "etl_job_runs_total",
        "job_name" => job_name.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record one processed source record and the latency of its call
#[inline]
pub fn record_record_processed(job_name: &str, call_seconds: f64) {
    counter!("etl_records_processed_total", "job_name" => job_name.to_string()).increment(1);
    histogram!("etl_call_duration_seconds", "job_name" => job_name.to_string())
        .record(call_seconds);
}

#[inline]
pub fn record_record_failed(job_name: &str, kind: &'static str) {
    counter!(
        "etl_records_failed_total",
        "job_name" => job_name.to_string(),
        "kind" => kind
    )
    .increment(1);
}

#[inline]
pub fn record_batch_write(outcome: &'static str) {
    counter!("etl_batch_writes_total", "outcome" => outcome).increment(1);
}

#[inline]
pub fn update_registered_triggers(count: usize) {
    gauge!("etl_registered_triggers").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_with_valid_level() {
        // A second initialisation in the same process reports an error instead of panicking
        let result = init_logging("info", false);
        assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn test_init_logging_json() {
        let result = init_logging("debug", true);
        assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn test_metrics_recording_without_recorder() {
        record_job_run("test-job", "success");
        record_record_processed("test-job", 0.25);
        record_record_failed("test-job", "external_call");
        record_batch_write("success");
        update_registered_triggers(3);
    }
}
