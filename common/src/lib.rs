// Common library for the ETL engine shared by the API binary and tests

pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod executor;
pub mod models;
pub mod scheduler;
pub mod telemetry;
pub mod transform;
