//! Migration file management.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};
use crate::sql::Statement;

/// Extension of migration files.
pub const MIGRATION_EXTENSION: &str = "sql";

/// A migration file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationFile {
    /// File name, used as the ledger key.
    pub name: String,
    /// Path to the file.
    pub path: PathBuf,
}

impl MigrationFile {
    /// Read and split the statements of this file.
    pub async fn statements(&self) -> MigrateResult<Vec<String>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(MigrationError::Io)?;
        Ok(split_statements(&content))
    }
}

/// Migration file reader/writer.
pub struct MigrationFileManager {
    /// Directory where migrations are stored.
    migrations_dir: PathBuf,
}

impl MigrationFileManager {
    /// Create a new file manager.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Get the migrations directory.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Ensure the migrations directory exists.
    pub async fn ensure_dir(&self) -> MigrateResult<()> {
        tokio::fs::create_dir_all(&self.migrations_dir)
            .await
            .map_err(MigrationError::Io)?;
        Ok(())
    }

    /// List all migration files, sorted by name.
    pub async fn list_migrations(&self) -> MigrateResult<Vec<MigrationFile>> {
        let mut migrations = Vec::new();

        if !self.migrations_dir.exists() {
            return Ok(migrations);
        }

        let mut entries = tokio::fs::read_dir(&self.migrations_dir)
            .await
            .map_err(MigrationError::Io)?;

        while let Some(entry) = entries.next_entry().await.map_err(MigrationError::Io)? {
            let path = entry.path();
            if !is_migration_file(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                migrations.push(MigrationFile {
                    name: name.to_string(),
                    path: path.clone(),
                });
            }
        }

        // Names are timestamp-prefixed, so lexical order is creation order
        migrations.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(migrations)
    }

    /// Write statements to a new migration file.
    pub async fn write_migration(&self, statements: &[Statement]) -> MigrateResult<PathBuf> {
        self.ensure_dir().await?;

        let path = self.migrations_dir.join(self.generate_name());
        let content = statements
            .iter()
            .map(Statement::as_str)
            .collect::<Vec<_>>()
            .join("\n");

        tokio::fs::write(&path, content)
            .await
            .map_err(MigrationError::Io)?;

        Ok(path)
    }

    /// Generate a new migration file name.
    pub fn generate_name(&self) -> String {
        format!(
            "migration_{}.{}",
            Utc::now().format("%Y%m%d%H%M%S%3f"),
            MIGRATION_EXTENSION
        )
    }
}

/// Check if a path is a migration file.
fn is_migration_file(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(MIGRATION_EXTENSION)
}

/// Split migration file content into statements.
///
/// Splits on every `;`, including one inside a quoted literal; generated
/// files never contain such literals.
pub fn split_statements(content: &str) -> Vec<String> {
    content
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::StatementKind;

    #[test]
    fn test_split_statements() {
        let content = "create table \"public\".\"a\" (\"id\" integer not null);\n\n  ;alter table \"public\".\"a\" add column \"b\" text null;\n";
        assert_eq!(
            split_statements(content),
            vec![
                "create table \"public\".\"a\" (\"id\" integer not null)".to_string(),
                "alter table \"public\".\"a\" add column \"b\" text null".to_string(),
            ]
        );
    }

    #[test]
    fn test_generate_name() {
        let manager = MigrationFileManager::new("migrations");
        let name = manager.generate_name();

        let stamp = name
            .strip_prefix("migration_")
            .and_then(|n| n.strip_suffix(".sql"))
            .unwrap();
        assert_eq!(stamp.len(), 17);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_list_only_sql_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "migration_20240102000000000.sql",
            "migration_20240101000000000.sql",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), "select 1;").unwrap();
        }
        std::fs::create_dir(dir.path().join("archive.sql")).unwrap();

        let manager = MigrationFileManager::new(dir.path());
        let names: Vec<String> = manager
            .list_migrations()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();

        assert_eq!(
            names,
            vec![
                "migration_20240101000000000.sql".to_string(),
                "migration_20240102000000000.sql".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = MigrationFileManager::new(dir.path().join("missing"));
        assert!(manager.list_migrations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let manager = MigrationFileManager::new(dir.path().join("database/migrations"));
        let statements = vec![
            Statement {
                sql: "create table \"public\".\"a\" (\"id\" integer not null);".to_string(),
                kind: StatementKind::Other,
            },
            Statement {
                sql: "create index \"id_index\" on \"public\".\"a\" (\"id\");".to_string(),
                kind: StatementKind::Other,
            },
        ];

        let path = manager.write_migration(&statements).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        let files = manager.list_migrations().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].statements().await.unwrap().len(), 2);
    }
}
