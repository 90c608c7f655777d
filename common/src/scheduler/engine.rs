// Trigger scheduler: registers cron triggers and runs run-once definitions

use crate::config::{ExecutorSettings, OverlapPolicy, SchedulerSettings};
use crate::db::JobDefinitionStore;
use crate::errors::{ExecutionError, FailedRun, ScheduleError, SchedulerError};
use crate::executor::JobRunner;
use crate::models::{JobDefinition, JobStatus};
use crate::scheduler::trigger::{parse_timezone, CronTrigger};
use crate::telemetry;
use chrono::Utc;
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Concurrent cron-triggered job bodies
    pub worker_pool_size: usize,
    pub overlap_policy: OverlapPolicy,
    pub timezone: Tz,
    /// Wait for batch writes before a run counts as finished
    pub wait_for_writes: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 10,
            overlap_policy: OverlapPolicy::Allow,
            timezone: chrono_tz::UTC,
            wait_for_writes: false,
        }
    }
}

impl SchedulerConfig {
    pub fn from_settings(
        scheduler: &SchedulerSettings,
        executor: &ExecutorSettings,
    ) -> Result<Self, ScheduleError> {
        Ok(Self {
            worker_pool_size: scheduler.worker_pool_size,
            overlap_policy: scheduler.overlap_policy,
            timezone: parse_timezone(&scheduler.timezone)?,
            wait_for_writes: executor.wait_for_writes,
        })
    }
}

/// What one scan did, by definition id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Cron triggers registered for the first time
    pub scheduled: Vec<i64>,
    /// Cron triggers left alone because nothing changed
    pub unchanged: Vec<i64>,
    /// Cron triggers cancelled and registered again with new settings
    pub replaced: Vec<i64>,
    /// Cron triggers whose definitions are gone or no longer eligible
    pub cancelled: Vec<i64>,
    /// Run-once definitions executed and marked COMPLETED
    pub completed: Vec<i64>,
    /// Ineligible definitions
    pub skipped: Vec<i64>,
    /// Definitions with an unparseable cron expression
    pub invalid: Vec<i64>,
}

struct RegisteredTrigger {
    fingerprint: String,
    handle: JoinHandle<()>,
}

/// Removes a job id from the running set when a triggered run ends
struct RunningGuard {
    running: Arc<std::sync::Mutex<HashSet<i64>>>,
    job_id: i64,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(&self.job_id);
    }
}

/// TriggerScheduler keeps one cron trigger per eligible definition id
pub struct TriggerScheduler {
    store: Arc<dyn JobDefinitionStore>,
    runner: Arc<dyn JobRunner>,
    config: SchedulerConfig,
    workers: Arc<Semaphore>,
    registry: Mutex<HashMap<i64, RegisteredTrigger>>,
    running: Arc<std::sync::Mutex<HashSet<i64>>>,
    scan_lock: Mutex<()>,
}

impl TriggerScheduler {
    pub fn new(
        store: Arc<dyn JobDefinitionStore>,
        runner: Arc<dyn JobRunner>,
        config: SchedulerConfig,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));
        Self {
            store,
            runner,
            config,
            workers,
            registry: Mutex::new(HashMap::new()),
            running: Arc::new(std::sync::Mutex::new(HashSet::new())),
            scan_lock: Mutex::new(()),
        }
    }

    /// Load queued definitions and reconcile the trigger registry against them.
    ///
    /// Run-once definitions execute on the calling task; their failures are
    /// collected and reported after every definition has been considered.
    #[instrument(skip(self))]
    pub async fn scan(&self) -> Result<ScanReport, SchedulerError> {
        let _scan = self.scan_lock.lock().await;

        let definitions = self.store.find_all_by_status(JobStatus::Queued).await?;
        info!(count = definitions.len(), "Found job definitions to schedule");

        let mut report = ScanReport::default();
        let mut failures = Vec::new();
        let mut wanted = HashSet::new();

        for definition in definitions {
            let id = definition.id;
            if !definition.is_eligible() {
                warn!(
                    job_id = id,
                    job_name = %definition.job_name,
                    "Job is not enabled or input table name is missing"
                );
                report.skipped.push(id);
                continue;
            }

            let Some(expression) = definition.cron() else {
                info!(job_id = id, job_name = %definition.job_name, "No cron expression; running job once");
                match self.run_once(&definition).await {
                    Ok(()) => report.completed.push(id),
                    Err(e) => {
                        error!(job_id = id, job_name = %definition.job_name, error = %e, "Run-once job failed");
                        failures.push(FailedRun {
                            job_id: id,
                            job_name: definition.job_name.clone(),
                            error: e.to_string(),
                        });
                    }
                }
                continue;
            };

            let trigger = match CronTrigger::new(expression, self.config.timezone) {
                Ok(trigger) => trigger,
                Err(e) => {
                    error!(job_id = id, error = %e, "Skipping job with invalid cron expression");
                    report.invalid.push(id);
                    continue;
                }
            };
            wanted.insert(id);

            let fingerprint = definition.trigger_fingerprint();
            let mut registry = self.registry.lock().await;
            match registry.get(&id) {
                Some(existing)
                    if existing.fingerprint == fingerprint && !existing.handle.is_finished() =>
                {
                    debug!(job_id = id, "Trigger unchanged");
                    report.unchanged.push(id);
                    continue;
                }
                Some(_) => {
                    if let Some(previous) = registry.remove(&id) {
                        previous.handle.abort();
                    }
                    info!(job_id = id, cron = trigger.expression(), "Replacing changed trigger");
                    report.replaced.push(id);
                }
                None => {
                    info!(
                        job_id = id,
                        job_name = %definition.job_name,
                        cron = trigger.expression(),
                        "Scheduling job"
                    );
                    report.scheduled.push(id);
                }
            }

            let handle = self.spawn_trigger(definition, trigger);
            registry.insert(id, RegisteredTrigger { fingerprint, handle });
        }

        {
            let mut registry = self.registry.lock().await;
            let stale: Vec<i64> = registry
                .keys()
                .filter(|id| !wanted.contains(*id))
                .copied()
                .collect();
            for id in stale {
                if let Some(trigger) = registry.remove(&id) {
                    trigger.handle.abort();
                    info!(job_id = id, "Cancelled trigger for job no longer eligible");
                    report.cancelled.push(id);
                }
            }
            telemetry::update_registered_triggers(registry.len());
        }

        if !failures.is_empty() {
            return Err(SchedulerError::RunsFailed(failures));
        }
        Ok(report)
    }

    /// Manual re-scan; same as [`TriggerScheduler::scan`]
    pub async fn trigger_check(&self) -> Result<ScanReport, SchedulerError> {
        self.scan().await
    }

    /// Ids with a registered cron trigger, ascending
    pub async fn registered_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.registry.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Cancel every trigger; runs already in progress finish on their own
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let mut registry = self.registry.lock().await;
        for (_, trigger) in registry.drain() {
            trigger.handle.abort();
        }
        telemetry::update_registered_triggers(0);
        info!("All triggers cancelled");
    }

    async fn run_once(&self, definition: &JobDefinition) -> Result<(), ExecutionError> {
        let run = self.runner.run(definition).await?;
        if self.config.wait_for_writes {
            run.writes.wait().await?;
        }

        let mut completed = definition.clone();
        completed.status = JobStatus::Completed;
        self.store.save(&completed).await?;
        info!(job_id = definition.id, "Run-once job marked COMPLETED");
        Ok(())
    }

    fn spawn_trigger(&self, definition: JobDefinition, trigger: CronTrigger) -> JoinHandle<()> {
        let runner = self.runner.clone();
        let workers = self.workers.clone();
        let running = self.running.clone();
        let overlap_policy = self.config.overlap_policy;
        let wait_for_writes = self.config.wait_for_writes;
        let definition = Arc::new(definition);

        tokio::spawn(async move {
            loop {
                let next = match trigger.next_after(Utc::now()) {
                    Ok(next) => next,
                    Err(e) => {
                        warn!(job_id = definition.id, error = %e, "Trigger has no further firings");
                        break;
                    }
                };
                let delay = (next - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(delay).await;

                let guard = match overlap_policy {
                    OverlapPolicy::Allow => None,
                    OverlapPolicy::Skip => {
                        let mut set = running.lock().unwrap_or_else(|e| e.into_inner());
                        if !set.insert(definition.id) {
                            warn!(job_id = definition.id, "Previous run still in progress; skipping firing");
                            continue;
                        }
                        Some(RunningGuard {
                            running: running.clone(),
                            job_id: definition.id,
                        })
                    }
                };

                let runner = runner.clone();
                let workers = workers.clone();
                let definition = definition.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    let Ok(_permit) = workers.acquire_owned().await else {
                        return;
                    };
                    run_triggered(runner.as_ref(), &definition, wait_for_writes).await;
                });
            }
        })
    }
}

/// Job body for a cron firing; failures are logged and swallowed so the trigger keeps firing
async fn run_triggered(runner: &dyn JobRunner, definition: &JobDefinition, wait_for_writes: bool) {
    debug!(job_id = definition.id, "Trigger fired");
    match runner.run(definition).await {
        Ok(run) => {
            if wait_for_writes {
                if let Err(e) = run.writes.wait().await {
                    error!(job_id = definition.id, error = %e, "Triggered job writes failed");
                }
            }
        }
        Err(e) => {
            error!(
                job_id = definition.id,
                job_name = %definition.job_name,
                error = %e,
                "Triggered job run failed"
            );
        }
    }
}

impl Drop for TriggerScheduler {
    fn drop(&mut self) {
        for (_, trigger) in self.registry.get_mut().drain() {
            trigger.handle.abort();
        }
    }
}
