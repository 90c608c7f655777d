// Database layer module

pub mod pool;
pub mod repositories;
pub mod tabular;

pub use pool::DbPool;
pub use repositories::{JobDefinitionRepository, JobDefinitionStore};
pub use tabular::{quote_identifier, PgTabularStore, TabularStore};
