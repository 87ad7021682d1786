//! `cheetah migration:*` commands.

use std::path::Path;

use cheetah_migrate::MigrationEngine;
use cheetah_postgres::{PgGateway, PgIntrospector, PgPool};

use crate::cli::GenerateArgs;
use crate::config::{self, Config};
use crate::entities::TomlEntityProvider;
use crate::error::CliResult;
use crate::output::{self, success, warn};

/// Run `cheetah migration:generate`
pub async fn generate(config_path: &Path, args: GenerateArgs) -> CliResult<()> {
    output::header("Migration Generate");

    let config = Config::load(config_path)?;
    let entities_path = config::resolve(config_path, &config.entities.path);
    let provider = TomlEntityProvider::new(&entities_path, &config.entities.default_schema);

    output::kv("Entities", &entities_path.display().to_string());

    let gateway = connect(&config).await?;
    let introspector = PgIntrospector::new(gateway.clone());
    let engine = MigrationEngine::new(config.migration_config(config_path), gateway);

    output::kv("Migrations", &engine.migrations_dir().display().to_string());
    output::newline();

    if args.dry_run {
        let statements = engine.plan(&provider, &introspector).await?;
        if statements.is_empty() {
            success("No changes detected");
        } else {
            let sql: Vec<&str> = statements.iter().map(|s| s.as_str()).collect();
            output::code(&sql.join("\n"));
            output::info(&format!("{} statements (dry run, nothing written)", statements.len()));
        }
        return Ok(());
    }

    let result = engine.generate(&provider, &introspector).await?;
    match result.path {
        Some(path) => {
            for statement in &result.statements {
                output::list_item(statement.as_str());
            }
            output::newline();
            success(&format!("Migration file created: {}", path.display()));
        }
        None => success("No changes detected"),
    }

    Ok(())
}

/// Run `cheetah migration:run`
pub async fn run(config_path: &Path) -> CliResult<()> {
    output::header("Migration Run");

    let config = Config::load(config_path)?;
    let gateway = connect(&config).await?;
    let engine = MigrationEngine::new(config.migration_config(config_path), gateway);

    output::kv("Migrations", &engine.migrations_dir().display().to_string());
    output::newline();

    let result = engine.migrate().await?;

    for skipped in &result.skipped_migrations {
        warn(&format!("Skipped {skipped}: older than the last applied migration"));
    }
    for applied in &result.applied_migrations {
        output::list_item(&format!("Migration executed: {applied}"));
    }

    output::newline();
    if result.applied_migrations.is_empty() {
        success("Database is up to date");
    } else {
        success(&result.summary());
    }

    Ok(())
}

/// Connect and fail fast when the database is unreachable.
async fn connect(config: &Config) -> CliResult<PgGateway> {
    let pg_config = config.database.to_pg_config()?;
    let gateway = PgGateway::new(PgPool::new(pg_config)?);
    gateway.ping().await?;
    Ok(gateway)
}
