//! Schema snapshot model.
//!
//! The same types describe both the desired schema (from the entity model)
//! and the actual schema (from the database introspector).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};

/// Default schema for tables that do not name one.
pub const DEFAULT_SCHEMA: &str = "public";

/// A reference from a column to a column of another table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referenced table name.
    pub table: String,
    /// Referenced column name.
    pub column: String,
}

impl ForeignKeyRef {
    /// Create a new foreign key reference.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// The `table.column` key used to compare references.
    pub fn key(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

/// A column in a table snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Type token on the desired side, dialect type name on the actual side.
    #[serde(rename = "type")]
    pub column_type: String,
    /// Length (varchar length, integer width, timestamp precision).
    pub length: Option<u32>,
    /// Numeric precision.
    pub precision: Option<u32>,
    /// Numeric scale.
    pub scale: Option<u32>,
    /// Whether the column accepts nulls.
    pub nullable: Option<bool>,
    /// Whether the column is part of the primary key.
    pub primary: Option<bool>,
    /// Whether the column carries a unique constraint.
    pub unique: Option<bool>,
    /// Whether the column is auto-incremented.
    pub auto_increment: Option<bool>,
    /// Default value as an SQL expression.
    pub default: Option<String>,
    /// Allowed values of an enum column, in declaration order.
    pub enum_items: Option<Vec<String>>,
    /// Outgoing foreign key references.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyRef>,
    /// Whether the column is a fixed-point decimal.
    #[serde(default)]
    pub is_decimal: bool,
}

impl ColumnInfo {
    /// Create a new column.
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            ..Default::default()
        }
    }

    /// Set the length.
    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Set precision and scale.
    pub fn numeric(mut self, precision: Option<u32>, scale: Option<u32>) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    /// Set nullability.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// Set the primary key flag.
    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = Some(primary);
        self
    }

    /// Set the unique flag.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = Some(unique);
        self
    }

    /// Set the auto-increment flag.
    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = Some(auto_increment);
        self
    }

    /// Set the default expression.
    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set the enum items.
    pub fn enum_items<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_items = Some(items.into_iter().map(Into::into).collect());
        self
    }

    /// Add a foreign key reference.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_keys.push(ForeignKeyRef::new(table, column));
        self
    }

    /// Mark the column as decimal.
    pub fn decimal(mut self) -> Self {
        self.is_decimal = true;
        self
    }

    /// Primary key flag, absent meaning false.
    pub fn is_primary(&self) -> bool {
        self.primary.unwrap_or(false)
    }

    /// Nullable flag, absent meaning false.
    pub fn is_nullable(&self) -> bool {
        self.nullable.unwrap_or(false)
    }

    /// Unique flag, absent meaning false.
    pub fn is_unique(&self) -> bool {
        self.unique.unwrap_or(false)
    }

    /// Auto-increment flag, absent meaning false.
    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment.unwrap_or(false)
    }

    /// Enum items, if the column has a non-empty list.
    pub fn items(&self) -> Option<&[String]> {
        self.enum_items.as_deref().filter(|items| !items.is_empty())
    }
}

/// An index in a table snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Indexed columns in key order.
    pub columns: Vec<String>,
}

impl IndexInfo {
    /// Create a new index.
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// A snapshot of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Table name.
    pub name: String,
    /// Schema name.
    pub schema: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnInfo>,
    /// Indexes in declaration order.
    #[serde(default)]
    pub indexes: Vec<IndexInfo>,
}

impl TableSnapshot {
    /// Create an empty table in the default schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Set the schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Add a column.
    pub fn column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    /// Add an index.
    pub fn index(mut self, index: IndexInfo) -> Self {
        self.indexes.push(index);
        self
    }

    /// Find a column by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Find an index by name.
    pub fn get_index(&self, name: &str) -> Option<&IndexInfo> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// Check the structural invariants of a snapshot list.
pub fn validate(tables: &[TableSnapshot]) -> MigrateResult<()> {
    let mut table_names = HashSet::new();

    for table in tables {
        if table.name.is_empty() {
            return Err(MigrationError::diff_inconsistency("table with an empty name"));
        }
        if !table_names.insert(table.name.as_str()) {
            return Err(MigrationError::diff_inconsistency(format!(
                "duplicate table '{}'",
                table.name
            )));
        }

        let mut column_names = HashSet::new();
        for column in &table.columns {
            if column.name.is_empty() {
                return Err(MigrationError::diff_inconsistency(format!(
                    "column with an empty name in table '{}'",
                    table.name
                )));
            }
            if !column_names.insert(column.name.as_str()) {
                return Err(MigrationError::diff_inconsistency(format!(
                    "duplicate column '{}' in table '{}'",
                    column.name, table.name
                )));
            }
        }

        let mut index_names = HashSet::new();
        for index in &table.indexes {
            if !index_names.insert(index.name.as_str()) {
                return Err(MigrationError::diff_inconsistency(format!(
                    "duplicate index '{}' in table '{}'",
                    index.name, table.name
                )));
            }
        }
    }

    Ok(())
}

/// Reject defaults and enum items containing `;`.
///
/// Migration files are split on `;` when run, so such a literal would cut
/// its statement in two.
pub fn validate_literals(tables: &[TableSnapshot]) -> MigrateResult<()> {
    for table in tables {
        for column in &table.columns {
            let default = column.default.iter().map(String::as_str);
            let items = column.items().unwrap_or_default().iter().map(String::as_str);

            if let Some(value) = default.chain(items).find(|v| v.contains(';')) {
                return Err(MigrationError::diff_inconsistency(format!(
                    "value {value:?} of column '{}.{}' contains ';'",
                    table.name, column.name
                )));
            }
        }
    }

    Ok(())
}
