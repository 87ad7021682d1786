//! SQL execution gateway.

use std::collections::HashMap;

use thiserror::Error;

use crate::error::{MigrateResult, MigrationError};

/// A result row, column name to text value.
pub type SqlRow = HashMap<String, Option<String>>;

/// Failure of an atomic batch.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BatchError {
    /// The statement that failed, `None` when the transaction itself failed.
    pub statement: Option<String>,
    /// Database error message.
    pub message: String,
}

impl BatchError {
    /// Create a batch error for a failed statement.
    pub fn statement(statement: impl Into<String>, err: impl ToString) -> Self {
        Self {
            statement: Some(statement.into()),
            message: err.to_string(),
        }
    }

    /// Create a batch error for a failed transaction command.
    pub fn transaction(err: impl ToString) -> Self {
        Self {
            statement: None,
            message: err.to_string(),
        }
    }

    /// Attach the migration file name.
    pub fn into_migration_error(self, file: &str) -> MigrationError {
        let statement = self.statement.unwrap_or_else(|| "<transaction>".to_string());
        MigrationError::statement_execution(file, statement, self.message)
    }
}

/// Executes SQL against a database connection.
#[async_trait::async_trait]
pub trait SqlGateway: Send + Sync {
    /// Execute a statement, returning the number of affected rows.
    async fn execute(&self, sql: &str) -> MigrateResult<u64>;

    /// Run a query, returning rows of text values.
    async fn query(&self, sql: &str) -> MigrateResult<Vec<SqlRow>>;

    /// Execute statements as one atomic unit.
    ///
    /// The default brackets the statements with `begin`/`commit` and rolls
    /// back on the first failure. Pooled implementations must override this
    /// to keep every statement on the same connection.
    async fn execute_atomic(&self, statements: &[String]) -> Result<(), BatchError> {
        self.execute("begin").await.map_err(BatchError::transaction)?;

        for statement in statements {
            if let Err(err) = self.execute(statement).await {
                if let Err(rollback) = self.execute("rollback").await {
                    tracing::warn!(error = %rollback, "Rollback failed");
                }
                return Err(BatchError::statement(statement.as_str(), err));
            }
        }

        self.execute("commit").await.map_err(BatchError::transaction)?;
        Ok(())
    }
}
