//! Error types for the migration engine.

use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Configuration could not be located or is incomplete.
    #[error("{0}")]
    ConfigurationMissing(String),

    /// The entity model provider yielded no tables.
    #[error("No entities found: {0}")]
    EntityDiscoveryEmpty(String),

    /// The introspector could not produce a snapshot for a table.
    #[error("Snapshot unavailable for table '{table}': {message}")]
    SnapshotUnavailable {
        /// Table that was being introspected.
        table: String,
        /// Underlying failure.
        message: String,
    },

    /// Snapshot input violates a structural invariant.
    #[error("Inconsistent schema snapshot: {0}")]
    DiffInconsistency(String),

    /// A statement of a migration file failed to execute.
    #[error("Migration '{file}' failed on statement `{statement}`: {message}")]
    StatementExecution {
        /// Migration file name.
        file: String,
        /// The statement that failed.
        statement: String,
        /// Database error message.
        message: String,
    },

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation error outside of a migration file.
    #[error("Database error: {0}")]
    Database(String),

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

impl MigrationError {
    /// Create a configuration missing error.
    pub fn configuration_missing(msg: impl Into<String>) -> Self {
        Self::ConfigurationMissing(msg.into())
    }

    /// Create an entity discovery error.
    pub fn entity_discovery_empty(msg: impl Into<String>) -> Self {
        Self::EntityDiscoveryEmpty(msg.into())
    }

    /// Create a snapshot unavailable error.
    pub fn snapshot_unavailable(table: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SnapshotUnavailable {
            table: table.into(),
            message: msg.into(),
        }
    }

    /// Create a diff inconsistency error.
    pub fn diff_inconsistency(msg: impl Into<String>) -> Self {
        Self::DiffInconsistency(msg.into())
    }

    /// Create a statement execution error.
    pub fn statement_execution(
        file: impl Into<String>,
        statement: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::StatementExecution {
            file: file.into(),
            statement: statement.into(),
            message: msg.into(),
        }
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Check if this is a recoverable error.
    ///
    /// Recoverable errors are logged and the operation continues with a
    /// degraded result instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EntityDiscoveryEmpty(_) | Self::SnapshotUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_missing_display() {
        let err = MigrationError::configuration_missing("Config file not found");
        assert_eq!(err.to_string(), "Config file not found");
    }

    #[test]
    fn test_statement_execution_display() {
        let err = MigrationError::statement_execution(
            "migration_20240101000000000.sql",
            "drop table \"public\".\"user\"",
            "table does not exist",
        );
        let msg = err.to_string();
        assert!(msg.contains("migration_20240101000000000.sql"));
        assert!(msg.contains("table does not exist"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(MigrationError::entity_discovery_empty("entities").is_recoverable());
        assert!(MigrationError::snapshot_unavailable("user", "timeout").is_recoverable());
        assert!(!MigrationError::database("connection").is_recoverable());
        assert!(!MigrationError::diff_inconsistency("duplicate").is_recoverable());
    }
}
