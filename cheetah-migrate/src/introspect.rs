//! Sources of the desired and actual schemas.

use crate::error::MigrateResult;
use crate::snapshot::TableSnapshot;

/// Yields the desired schema.
pub trait EntityModelProvider: Send + Sync {
    /// All declared tables.
    fn tables(&self) -> MigrateResult<Vec<TableSnapshot>>;
}

impl EntityModelProvider for Vec<TableSnapshot> {
    fn tables(&self) -> MigrateResult<Vec<TableSnapshot>> {
        Ok(self.clone())
    }
}

/// Reads the actual schema of a live database.
#[async_trait::async_trait]
pub trait DatabaseIntrospector: Send + Sync {
    /// Snapshot one table, or `None` if it does not exist.
    async fn snapshot(&self, table: &str, schema: &str) -> MigrateResult<Option<TableSnapshot>>;
}
