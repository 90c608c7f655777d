// Tabular store: sink DDL, paged source reads and batched result inserts

use crate::db::DbPool;
use crate::errors::StoreError;
use crate::models::ResultRecord;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, instrument};

lazy_static! {
    static ref IDENTIFIER: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
            .expect("Invalid regex pattern");
}

/// Rows per INSERT statement; three binds per row stays well under the Postgres limit
const INSERT_CHUNK_ROWS: usize = 1000;

/// Check a relation name and return it double-quoted, ready for interpolation.
///
/// Accepts `name` or `schema.name`, each part matching `[A-Za-z_][A-Za-z0-9_]*`.
pub fn quote_identifier(name: &str) -> Result<String, StoreError> {
    if !IDENTIFIER.is_match(name) {
        return Err(StoreError::InvalidIdentifier(name.to_string()));
    }
    Ok(name
        .split('.')
        .map(|part| format!("\"{}\"", part))
        .collect::<Vec<_>>()
        .join("."))
}

/// TabularStore is the executor's view of the relational store
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Create the per-run sink relation `(id, request, response, time_taken)`
    async fn create_sink(&self, table: &str) -> Result<(), StoreError>;

    /// Read the `request` column of one page, ordered by `id`
    async fn read_page(&self, table: &str, limit: i64, offset: i64)
        -> Result<Vec<String>, StoreError>;

    /// Insert a batch of results; returns the number of rows written
    async fn insert_batch(&self, table: &str, records: &[ResultRecord]) -> Result<u64, StoreError>;
}

/// Postgres-backed tabular store
#[derive(Debug, Clone)]
pub struct PgTabularStore {
    pool: DbPool,
}

impl PgTabularStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TabularStore for PgTabularStore {
    #[instrument(skip(self))]
    async fn create_sink(&self, table: &str) -> Result<(), StoreError> {
        let quoted = quote_identifier(table)?;
        let ddl = format!(
            "CREATE TABLE {} (id BIGSERIAL PRIMARY KEY, request TEXT, response TEXT, time_taken BIGINT)",
            quoted
        );

        sqlx::query(&ddl)
            .execute(self.pool.pool())
            .await
            .map_err(|e| StoreError::SinkCreation {
                table: table.to_string(),
                reason: e.to_string(),
            })?;

        debug!(table = %table, "Created sink relation");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn read_page(
        &self,
        table: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<String>, StoreError> {
        let quoted = quote_identifier(table)?;
        let sql = format!(
            "SELECT request::text AS request FROM {} ORDER BY id LIMIT $1 OFFSET $2",
            quoted
        );

        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool.pool())
            .await?;

        let mut page = Vec::with_capacity(rows.len());
        for row in rows {
            let request: Option<String> = row.try_get("request")?;
            page.push(request.unwrap_or_default());
        }

        debug!(rows = page.len(), "Read source page");
        Ok(page)
    }

    #[instrument(skip(self, records), fields(records = records.len()))]
    async fn insert_batch(&self, table: &str, records: &[ResultRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let quoted = quote_identifier(table)?;

        let mut written = 0;
        for chunk in records.chunks(INSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (request, response, time_taken) ",
                quoted
            ));
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(&record.request)
                    .push_bind(&record.response)
                    .push_bind(record.time_taken_millis);
            });

            let result = builder.build().execute(self.pool.pool()).await?;
            written += result.rows_affected();
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_accepts_plain_and_qualified_names() {
        assert_eq!(quote_identifier("orders").unwrap(), "\"orders\"");
        assert_eq!(
            quote_identifier("etl.orders_batch_output_20250101120000").unwrap(),
            "\"etl\".\"orders_batch_output_20250101120000\""
        );
        assert_eq!(quote_identifier("_Mixed9").unwrap(), "\"_Mixed9\"");
    }

    #[test]
    fn test_quote_identifier_rejects_injection() {
        for bad in [
            "",
            "9orders",
            "orders; DROP TABLE x",
            "orders\"",
            "a.b.c",
            "orders--",
            "or ders",
        ] {
            assert!(
                matches!(quote_identifier(bad), Err(StoreError::InvalidIdentifier(_))),
                "{} should be rejected",
                bad
            );
        }
    }
}
