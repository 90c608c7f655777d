// Scheduler module for cron triggers and run-once jobs

pub mod engine;
pub mod trigger;

pub use engine::{ScanReport, SchedulerConfig, TriggerScheduler};
pub use trigger::{parse_cron_expression, parse_timezone, CronTrigger};
