//! Migration ledger.
//!
//! Applied migration files are recorded by name in the `cheetah_migrations`
//! table. The file name is the primary key, so a second invoker racing to
//! record the same file fails on insert.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::MigrateResult;
use crate::file::MigrationFile;
use crate::gateway::SqlGateway;
use crate::sql::literal;

/// Name of the ledger table.
pub const LEDGER_TABLE: &str = "cheetah_migrations";

/// Column holding the applied file name.
pub const LEDGER_COLUMN: &str = "migration_file";

/// A record of an applied migration file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Migration file name.
    pub migration_file: String,
}

/// Files selected for a run.
#[derive(Debug, Default)]
pub struct PendingMigrations<'a> {
    /// Files to execute, in order.
    pub pending: Vec<&'a MigrationFile>,
    /// Unrecorded files older than the last applied one. These never run.
    pub skipped: Vec<&'a MigrationFile>,
}

impl PendingMigrations<'_> {
    /// Check if there is nothing to run.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Ledger stored in the target database.
pub struct MigrationLedger<'a> {
    gateway: &'a dyn SqlGateway,
}

impl<'a> MigrationLedger<'a> {
    /// Create a ledger over a gateway.
    pub fn new(gateway: &'a dyn SqlGateway) -> Self {
        Self { gateway }
    }

    /// Create the ledger table if it does not exist.
    pub async fn initialize(&self) -> MigrateResult<()> {
        self.gateway.execute(&create_table_sql()).await?;
        Ok(())
    }

    /// All applied records, ordered by file name.
    pub async fn applied(&self) -> MigrateResult<Vec<MigrationRecord>> {
        let rows = self.gateway.query(&select_sql()).await?;
        let mut records: Vec<MigrationRecord> = rows
            .into_iter()
            .filter_map(|mut row| row.remove(LEDGER_COLUMN).flatten())
            .map(|migration_file| MigrationRecord { migration_file })
            .collect();
        records.sort();
        Ok(records)
    }

    /// Record a file as applied.
    pub async fn record(&self, file: &str) -> MigrateResult<()> {
        self.gateway.execute(&insert_sql(file)).await?;
        Ok(())
    }
}

/// DDL of the ledger table.
pub fn create_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS \"{LEDGER_TABLE}\" (\"{LEDGER_COLUMN}\" character varying(255) NOT NULL PRIMARY KEY UNIQUE);"
    )
}

/// Query reading all applied records.
pub fn select_sql() -> String {
    format!("SELECT * FROM \"{LEDGER_TABLE}\" ORDER BY \"{LEDGER_COLUMN}\" ASC;")
}

/// Statement recording a file as applied.
pub fn insert_sql(file: &str) -> String {
    format!(
        "INSERT INTO \"{LEDGER_TABLE}\" (\"{LEDGER_COLUMN}\") VALUES ({});",
        literal(file)
    )
}

/// Select the files to run.
///
/// Execution resumes after the greatest recorded name. Files sorting before
/// it that were never recorded are reported as skipped.
pub fn select_pending<'a>(
    files: &'a [MigrationFile],
    applied: &[MigrationRecord],
) -> PendingMigrations<'a> {
    let recorded: HashSet<&str> = applied.iter().map(|r| r.migration_file.as_str()).collect();
    let last = applied.iter().map(|r| r.migration_file.as_str()).max();

    let mut selection = PendingMigrations::default();
    for file in files {
        match last {
            Some(last) if file.name.as_str() <= last => {
                if !recorded.contains(file.name.as_str()) {
                    selection.skipped.push(file);
                }
            }
            _ => selection.pending.push(file),
        }
    }
    selection
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;

    fn files(names: &[&str]) -> Vec<MigrationFile> {
        names
            .iter()
            .map(|name| MigrationFile {
                name: name.to_string(),
                path: PathBuf::from(name),
            })
            .collect()
    }

    fn records(names: &[&str]) -> Vec<MigrationRecord> {
        names
            .iter()
            .map(|name| MigrationRecord {
                migration_file: name.to_string(),
            })
            .collect()
    }

    fn names(files: &[&MigrationFile]) -> Vec<String> {
        files.iter().map(|f| f.name.clone()).collect()
    }

    #[test]
    fn test_ledger_sql() {
        assert_eq!(
            create_table_sql(),
            "CREATE TABLE IF NOT EXISTS \"cheetah_migrations\" (\"migration_file\" character varying(255) NOT NULL PRIMARY KEY UNIQUE);"
        );
        assert_eq!(
            select_sql(),
            "SELECT * FROM \"cheetah_migrations\" ORDER BY \"migration_file\" ASC;"
        );
        assert_eq!(
            insert_sql("migration_1.sql"),
            "INSERT INTO \"cheetah_migrations\" (\"migration_file\") VALUES ('migration_1.sql');"
        );
    }

    #[test]
    fn test_empty_ledger_runs_everything() {
        let files = files(&["migration_1.sql", "migration_2.sql"]);
        let selection = select_pending(&files, &[]);
        assert_eq!(names(&selection.pending), vec!["migration_1.sql", "migration_2.sql"]);
        assert!(selection.skipped.is_empty());
    }

    #[test]
    fn test_resume_after_last_applied() {
        let files = files(&["migration_1.sql", "migration_2.sql", "migration_3.sql"]);
        let selection = select_pending(&files, &records(&["migration_1.sql", "migration_2.sql"]));
        assert_eq!(names(&selection.pending), vec!["migration_3.sql"]);
    }

    #[test]
    fn test_up_to_date() {
        let files = files(&["migration_1.sql"]);
        let selection = select_pending(&files, &records(&["migration_1.sql"]));
        assert!(selection.is_empty());
    }

    #[test]
    fn test_missing_last_file_still_resumes_after_it() {
        let files = files(&["migration_1.sql", "migration_3.sql"]);
        let selection = select_pending(&files, &records(&["migration_1.sql", "migration_2.sql"]));
        assert_eq!(names(&selection.pending), vec!["migration_3.sql"]);
        assert!(selection.skipped.is_empty());
    }

    #[test]
    fn test_older_unrecorded_files_are_skipped() {
        let files = files(&["migration_1.sql", "migration_2.sql", "migration_3.sql"]);
        let selection = select_pending(&files, &records(&["migration_2.sql"]));
        assert_eq!(names(&selection.pending), vec!["migration_3.sql"]);
        assert_eq!(names(&selection.skipped), vec!["migration_1.sql"]);
    }
}
