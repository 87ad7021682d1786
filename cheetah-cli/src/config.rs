//! CLI configuration handling.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use cheetah_migrate::MigrationConfig;
use cheetah_migrate::engine::DEFAULT_MIGRATIONS_DIR;
use cheetah_migrate::snapshot::DEFAULT_SCHEMA;
use cheetah_postgres::PgConfig;

use crate::error::{CliError, CliResult};

/// Default config file name (lives in project root)
pub const CONFIG_FILE_NAME: &str = "cheetah.toml";

/// Default entity descriptor path (relative to project root)
pub const ENTITIES_PATH: &str = "entities";

/// Cheetah CLI configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Migration configuration
    pub migrations: MigrationsConfig,

    /// Entity descriptor configuration
    pub entities: EntitiesConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CliResult<Self> {
        if !path.is_file() {
            return Err(CliError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Database configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: Option<String>,
    /// Host
    pub host: Option<String>,
    /// Port
    pub port: Option<u16>,
    /// Username
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Database name
    pub database: Option<String>,
}

impl DatabaseConfig {
    /// Build the connection configuration.
    pub fn to_pg_config(&self) -> CliResult<PgConfig> {
        if self.url.is_none() && self.database.is_none() {
            return Err(CliError::Config(
                "[database] needs either `url` or `database`".to_string(),
            ));
        }

        let mut builder = PgConfig::builder();
        if let Some(url) = &self.url {
            builder = builder.url(url);
        }
        if let Some(host) = &self.host {
            builder = builder.host(host);
        }
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(username) = &self.username {
            builder = builder.user(username);
        }
        if let Some(password) = &self.password {
            builder = builder.password(password);
        }
        if let Some(database) = &self.database {
            builder = builder.database(database);
        }
        Ok(builder.build()?)
    }
}

/// Migration configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    /// Directory for migration files
    pub directory: String,

    /// Run each file in a single transaction
    pub transactional: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            directory: DEFAULT_MIGRATIONS_DIR.to_string(),
            transactional: true,
        }
    }
}

/// Entity descriptor configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntitiesConfig {
    /// A descriptor file or a directory of them
    pub path: String,

    /// Schema of tables that do not name one
    pub default_schema: String,
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        Self {
            path: ENTITIES_PATH.to_string(),
            default_schema: DEFAULT_SCHEMA.to_string(),
        }
    }
}

/// Resolve a configured path against the directory of the config file.
pub fn resolve(config_path: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match config_path.parent() {
        Some(parent) => parent.join(path),
        None => path.to_path_buf(),
    }
}

impl Config {
    /// Engine configuration for this project.
    pub fn migration_config(&self, config_path: &Path) -> MigrationConfig {
        MigrationConfig::new()
            .migrations_dir(resolve(config_path, &self.migrations.directory))
            .transactional(self.migrations.transactional)
    }
}
