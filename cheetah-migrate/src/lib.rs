//! # cheetah-migrate
//!
//! Schema migrations for the Cheetah ORM.
//!
//! This crate provides functionality for:
//! - Diffing declared entity tables against the live database schema
//! - Synthesizing PostgreSQL DDL for the difference
//! - Filtering redundant statements out of a migration
//! - Writing timestamped migration files
//! - Applying pending files and recording them in `cheetah_migrations`
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ Entities     │────▶│ Schema Differ  │────▶│ SQL Gen     │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!        ▲                     ▲                     │
//!        │                     │                     ▼
//!        │             ┌────────────────┐     ┌─────────────┐
//!        │             │ Introspector   │     │ Filter      │
//!        │             └────────────────┘     └─────────────┘
//!        │                                           │
//!                                                    ▼
//!                      ┌────────────────┐     ┌─────────────┐
//!                      │ Ledger Table   │◀────│ .sql files  │
//!                      └────────────────┘     └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use cheetah_migrate::{MigrationConfig, MigrationEngine};
//!
//! async fn run(gateway: impl cheetah_migrate::SqlGateway) -> cheetah_migrate::MigrateResult<()> {
//!     let config = MigrationConfig::new().migrations_dir("database/migrations");
//!     let engine = MigrationEngine::new(config, gateway);
//!
//!     let result = engine.migrate().await?;
//!     println!("{}", result.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Migration Files
//!
//! Each generated file holds one statement per line and is named after its
//! creation time in UTC:
//!
//! ```text
//! database/migrations/
//! ├── migration_20240101093000123.sql
//! └── migration_20240102174512004.sql
//! ```

pub mod diff;
pub mod engine;
pub mod error;
pub mod file;
pub mod filter;
pub mod gateway;
pub mod introspect;
pub mod ledger;
pub mod snapshot;
pub mod sql;
pub mod types;

// Re-exports
pub use diff::{
    ColumnChanges, ColumnDefault, ColumnDiff, DiffAction, IndexTarget, SchemaDiffer, TableDiff,
    compute_diff,
};
pub use engine::{GenerateResult, MigrationConfig, MigrationEngine, MigrationResult};
pub use error::{MigrateResult, MigrationError};
pub use file::{MigrationFile, MigrationFileManager};
pub use filter::filter;
pub use gateway::{BatchError, SqlGateway, SqlRow};
pub use introspect::{DatabaseIntrospector, EntityModelProvider};
pub use ledger::{MigrationLedger, MigrationRecord};
pub use snapshot::{ColumnInfo, ForeignKeyRef, IndexInfo, TableSnapshot};
pub use sql::{SqlGenerator, Statement, StatementKind, synthesize};
pub use types::Dialect;
