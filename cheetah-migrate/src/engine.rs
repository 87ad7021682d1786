//! Migration engine implementation.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::diff::compute_diff;
use crate::error::{MigrateResult, MigrationError};
use crate::file::{MigrationFile, MigrationFileManager};
use crate::filter::filter;
use crate::gateway::SqlGateway;
use crate::introspect::{DatabaseIntrospector, EntityModelProvider};
use crate::ledger::{self, MigrationLedger};
use crate::sql::{Statement, synthesize};
use crate::types::Dialect;

/// Default migrations directory, relative to the working directory.
pub const DEFAULT_MIGRATIONS_DIR: &str = "database/migrations";

/// Configuration for the migration engine.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Path to the migrations directory.
    pub migrations_dir: PathBuf,
    /// Target dialect.
    pub dialect: Dialect,
    /// Whether each migration file runs in a single transaction.
    pub transactional: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            dialect: Dialect::Postgres,
            transactional: true,
        }
    }
}

impl MigrationConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Set the dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set whether files run transactionally.
    pub fn transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }
}

/// Result of generating a migration.
#[derive(Debug)]
pub struct GenerateResult {
    /// Final statements.
    pub statements: Vec<Statement>,
    /// Path of the written file, `None` when nothing changed.
    pub path: Option<PathBuf>,
}

impl GenerateResult {
    /// Check if any change was detected.
    pub fn has_changes(&self) -> bool {
        !self.statements.is_empty()
    }
}

/// Result of a migration run.
#[derive(Debug, Default)]
pub struct MigrationResult {
    /// Files applied, in order.
    pub applied_migrations: Vec<String>,
    /// Unrecorded files older than the last applied one.
    pub skipped_migrations: Vec<String>,
    /// Total duration in milliseconds.
    pub duration_ms: i64,
}

impl MigrationResult {
    /// Number of applied files.
    pub fn applied_count(&self) -> usize {
        self.applied_migrations.len()
    }

    /// Get a summary of the result.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if !self.applied_migrations.is_empty() {
            parts.push(format!("{} applied", self.applied_migrations.len()));
        }

        if !self.skipped_migrations.is_empty() {
            parts.push(format!("{} skipped", self.skipped_migrations.len()));
        }

        if parts.is_empty() {
            "No migrations applied".to_string()
        } else {
            format!("{} in {}ms", parts.join(", "), self.duration_ms)
        }
    }
}

/// The main migration engine.
pub struct MigrationEngine<G: SqlGateway> {
    config: MigrationConfig,
    gateway: G,
    file_manager: MigrationFileManager,
}

impl<G: SqlGateway> MigrationEngine<G> {
    /// Create a new migration engine.
    pub fn new(config: MigrationConfig, gateway: G) -> Self {
        let file_manager = MigrationFileManager::new(&config.migrations_dir);
        Self {
            config,
            gateway,
            file_manager,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Get the gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Get the migrations directory.
    pub fn migrations_dir(&self) -> &Path {
        self.file_manager.migrations_dir()
    }

    /// Compute the statements that bring the database to the desired schema.
    pub async fn plan(
        &self,
        provider: &dyn EntityModelProvider,
        introspector: &dyn DatabaseIntrospector,
    ) -> MigrateResult<Vec<Statement>> {
        let desired = match provider.tables() {
            Ok(tables) if tables.is_empty() => {
                warn!("{}", MigrationError::entity_discovery_empty("no tables declared"));
                return Ok(Vec::new());
            }
            Ok(tables) => tables,
            Err(err @ MigrationError::EntityDiscoveryEmpty(_)) => {
                warn!("{err}");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let mut actual = Vec::with_capacity(desired.len());
        for table in &desired {
            match introspector.snapshot(&table.name, &table.schema).await {
                Ok(Some(snapshot)) => actual.push(snapshot),
                Ok(None) => debug!(table = %table.name, "Table does not exist"),
                Err(err @ MigrationError::SnapshotUnavailable { .. }) => {
                    warn!(table = %table.name, "{err}");
                }
                Err(err) => return Err(err),
            }
        }

        let diffs = compute_diff(&actual, &desired, self.config.dialect)?;
        for diff in &diffs {
            debug!(table = %diff.table, "{}", diff.summary());
        }

        let statements = filter(synthesize(&diffs, self.config.dialect));
        for statement in &statements {
            debug!(sql = %statement, "Planned statement");
        }

        Ok(statements)
    }

    /// Generate a migration file from the current schema difference.
    pub async fn generate(
        &self,
        provider: &dyn EntityModelProvider,
        introspector: &dyn DatabaseIntrospector,
    ) -> MigrateResult<GenerateResult> {
        let statements = self.plan(provider, introspector).await?;

        if statements.is_empty() {
            info!("No changes detected");
            return Ok(GenerateResult {
                statements,
                path: None,
            });
        }

        let path = self.file_manager.write_migration(&statements).await?;
        info!("Migration file created: {}", path.display());

        Ok(GenerateResult {
            statements,
            path: Some(path),
        })
    }

    /// Apply pending migration files.
    pub async fn migrate(&self) -> MigrateResult<MigrationResult> {
        let start = Instant::now();
        let mut result = MigrationResult::default();

        let files = self.file_manager.list_migrations().await?;
        if files.is_empty() {
            info!("No migration files found");
            return Ok(result);
        }

        let ledger = MigrationLedger::new(&self.gateway);
        ledger.initialize().await?;
        let applied = ledger.applied().await?;

        let selection = ledger::select_pending(&files, &applied);
        for file in &selection.skipped {
            warn!(
                file = %file.name,
                "Migration file is older than the last applied migration and was never run"
            );
            result.skipped_migrations.push(file.name.clone());
        }

        if selection.is_empty() {
            info!("Database is up to date");
            result.duration_ms = start.elapsed().as_millis() as i64;
            return Ok(result);
        }

        for file in selection.pending {
            self.apply_migration(&ledger, file).await?;
            info!("Migration executed: {}", file.name);
            result.applied_migrations.push(file.name.clone());
        }

        result.duration_ms = start.elapsed().as_millis() as i64;
        Ok(result)
    }

    /// Execute one file and record it in the ledger.
    async fn apply_migration(&self, ledger: &MigrationLedger<'_>, file: &MigrationFile) -> MigrateResult<()> {
        let statements = file.statements().await?;
        debug!(file = %file.name, count = statements.len(), "Applying migration");

        if self.config.transactional {
            let mut batch = statements;
            batch.push(ledger::insert_sql(&file.name));
            return self
                .gateway
                .execute_atomic(&batch)
                .await
                .map_err(|err| err.into_migration_error(&file.name));
        }

        for statement in &statements {
            debug!(sql = %statement, "Executing statement");
            self.gateway
                .execute(statement)
                .await
                .map_err(|err| MigrationError::statement_execution(&file.name, statement, err.to_string()))?;
        }
        ledger.record(&file.name).await
    }
}
