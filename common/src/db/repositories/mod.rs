// Repository layer for database operations

pub mod job_definition;

pub use job_definition::{JobDefinitionRepository, JobDefinitionStore};
