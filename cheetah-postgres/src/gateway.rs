//! SQL gateway over a PostgreSQL pool.

use cheetah_migrate::{BatchError, MigrateResult, SqlGateway, SqlRow};
use tokio_postgres::SimpleQueryMessage;
use tracing::debug;

use crate::error::PgError;
use crate::pool::PgPool;

/// Executes migration SQL through the simple query protocol.
#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    /// Create a gateway over a pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check that a connection can be acquired and used.
    pub async fn ping(&self) -> MigrateResult<()> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await.map_err(PgError::from)?;
        Ok(())
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl SqlGateway for PgGateway {
    async fn execute(&self, sql: &str) -> MigrateResult<u64> {
        debug!(sql = %sql, "Executing statement");
        let client = self.pool.get().await?;
        let messages = client.simple_query(sql).await.map_err(PgError::from)?;
        Ok(rows_affected(&messages))
    }

    async fn query(&self, sql: &str) -> MigrateResult<Vec<SqlRow>> {
        debug!(sql = %sql, "Executing query");
        let client = self.pool.get().await?;
        let messages = client.simple_query(sql).await.map_err(PgError::from)?;
        Ok(into_rows(messages))
    }

    async fn execute_atomic(&self, statements: &[String]) -> Result<(), BatchError> {
        let mut client = self.pool.get().await.map_err(BatchError::transaction)?;
        let transaction = client.transaction().await.map_err(BatchError::transaction)?;

        for statement in statements {
            debug!(sql = %statement, "Executing statement in transaction");
            // Dropping the transaction rolls it back.
            transaction
                .simple_query(statement)
                .await
                .map_err(|err| BatchError::statement(statement.as_str(), describe(&err)))?;
        }

        transaction.commit().await.map_err(BatchError::transaction)
    }
}

/// Total rows reported by the command completions.
fn rows_affected(messages: &[SimpleQueryMessage]) -> u64 {
    messages
        .iter()
        .map(|message| match message {
            SimpleQueryMessage::CommandComplete(count) => *count,
            _ => 0,
        })
        .sum()
}

fn into_rows(messages: Vec<SimpleQueryMessage>) -> Vec<SqlRow> {
    messages
        .into_iter()
        .filter_map(|message| match message {
            SimpleQueryMessage::Row(row) => Some(
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(i, column)| (column.name().to_string(), row.get(i).map(String::from)))
                    .collect(),
            ),
            _ => None,
        })
        .collect()
}

/// Prefer the server message over the driver's generic "db error".
fn describe(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => db.message().to_string(),
        None => err.to_string(),
    }
}
