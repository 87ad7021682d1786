//! Schema diffing.
//!
//! Compares the actual (database) snapshot list with the desired (entity)
//! snapshot list and produces an ordered list of table diffs. The ordering of
//! column diffs inside a table diff is significant: the synthesizer emits
//! statements in the same order.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::MigrateResult;
use crate::snapshot::{self, ColumnInfo, ForeignKeyRef, IndexInfo, TableSnapshot};
use crate::types::{self, CanonicalType, Dialect, canonicalize};

/// Column target meaning the whole table.
pub const WHOLE_TABLE: &str = "*";

/// Column target of a bulk index operation.
pub const ALL_INDEXES: &str = "all";

/// Kind of change carried by a [`ColumnDiff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiffAction {
    /// Add a column (or enum items to a column).
    Create,
    /// Alter an existing column.
    Alter,
    /// Drop a column, or the whole table when targeting [`WHOLE_TABLE`].
    Delete,
    /// Create or drop indexes.
    Index,
}

/// A change of a column's default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnDefault {
    /// Set the default to an SQL expression.
    Set(String),
    /// Remove the default.
    Drop,
}

/// The subset of column attributes a diff changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnChanges {
    /// Auto-increment flag.
    pub auto_increment: Option<bool>,
    /// Default value change.
    pub default: Option<ColumnDefault>,
    /// Primary key flag.
    pub primary: Option<bool>,
    /// Unique flag.
    pub unique: Option<bool>,
    /// Nullable flag.
    pub nullable: Option<bool>,
    /// Enum items.
    pub enum_items: Option<Vec<String>>,
    /// Full replacement list of foreign keys; empty means drop.
    pub foreign_keys: Option<Vec<ForeignKeyRef>>,
    /// Numeric precision.
    pub precision: Option<u32>,
    /// Numeric scale.
    pub scale: Option<u32>,
}

/// An index to create or drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTarget {
    /// Index name.
    pub name: String,
    /// Columns to index. `None` means drop the index.
    pub columns: Option<Vec<String>>,
    /// Columns the existing index depends on (set on drops).
    pub dependent_columns: Vec<String>,
}

impl IndexTarget {
    /// An index to create.
    pub fn create(index: &IndexInfo) -> Self {
        Self {
            name: index.name.clone(),
            columns: Some(index.columns.clone()),
            dependent_columns: Vec::new(),
        }
    }

    /// An index to drop.
    pub fn drop(index: &IndexInfo) -> Self {
        Self {
            name: index.name.clone(),
            columns: None,
            dependent_columns: index.columns.clone(),
        }
    }

    /// Check if this target drops the index.
    pub fn is_drop(&self) -> bool {
        self.columns.is_none()
    }
}

/// A single column-level (or index-level) change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDiff {
    /// Kind of change.
    pub action: DiffAction,
    /// Target column, [`WHOLE_TABLE`], or [`ALL_INDEXES`].
    pub column: String,
    /// New canonical type.
    pub column_type: Option<String>,
    /// New length.
    pub length: Option<u32>,
    /// Attribute changes.
    pub changes: Option<ColumnChanges>,
    /// Index targets of an [`DiffAction::Index`] diff.
    pub indexes: Vec<IndexTarget>,
    /// An existing enum check constraint must be dropped first.
    pub drop_check: bool,
}

impl ColumnDiff {
    fn new(action: DiffAction, column: impl Into<String>) -> Self {
        Self {
            action,
            column: column.into(),
            column_type: None,
            length: None,
            changes: None,
            indexes: Vec::new(),
            drop_check: false,
        }
    }

    fn alter(column: &str, changes: ColumnChanges) -> Self {
        let mut diff = Self::new(DiffAction::Alter, column);
        diff.changes = Some(changes);
        diff
    }

    fn index(column: impl Into<String>, indexes: Vec<IndexTarget>) -> Self {
        let mut diff = Self::new(DiffAction::Index, column);
        diff.indexes = indexes;
        diff
    }

    /// Attribute changes, or an empty set.
    pub fn changes(&self) -> ColumnChanges {
        self.changes.clone().unwrap_or_default()
    }
}

/// All changes for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDiff {
    /// Table name.
    pub table: String,
    /// Schema name.
    pub schema: String,
    /// The table does not exist yet.
    pub new_table: bool,
    /// Ordered column diffs.
    pub columns: Vec<ColumnDiff>,
}

impl TableDiff {
    /// Check if this diff drops the whole table.
    pub fn drops_table(&self) -> bool {
        matches!(
            self.columns.as_slice(),
            [ColumnDiff { action: DiffAction::Delete, column, .. }] if column == WHOLE_TABLE
        )
    }

    /// Get a summary of the diff.
    pub fn summary(&self) -> String {
        if self.new_table {
            return format!("Create table {}.{}", self.schema, self.table);
        }
        if self.drops_table() {
            return format!("Drop table {}.{}", self.schema, self.table);
        }
        format!(
            "Alter table {}.{} ({} changes)",
            self.schema,
            self.table,
            self.columns.len()
        )
    }
}

/// Column of the actual schema, normalized for comparison.
#[derive(Debug)]
struct NormalizedColumn<'a> {
    raw: &'a ColumnInfo,
    column_type: String,
    length: Option<u32>,
}

impl<'a> NormalizedColumn<'a> {
    fn new(raw: &'a ColumnInfo, dialect: Dialect) -> Self {
        let mut column_type = if raw.column_type == types::USER_DEFINED {
            types::ENUM.to_string()
        } else {
            raw.column_type.clone()
        };
        let mut length = raw.length;

        if raw.is_decimal && dialect.is_postgres() {
            column_type = types::DECIMAL.to_string();
            length = Some(raw.precision.unwrap_or(0));
        }

        Self {
            raw,
            column_type,
            length,
        }
    }

    /// Enum values enforced by a check constraint rather than a native type.
    fn is_check_enum(&self) -> bool {
        self.raw.column_type == types::ENUM
    }
}

/// Schema differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaDiffer {
    dialect: Dialect,
}

impl SchemaDiffer {
    /// Create a new differ for a dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Compute the changes needed to turn `actual` into `desired`.
    pub fn diff(
        &self,
        actual: &[TableSnapshot],
        desired: &[TableSnapshot],
    ) -> MigrateResult<Vec<TableDiff>> {
        snapshot::validate(actual)?;
        snapshot::validate(desired)?;
        snapshot::validate_literals(desired)?;

        let actual_map: HashMap<&str, &TableSnapshot> =
            actual.iter().map(|t| (t.name.as_str(), t)).collect();
        let desired_map: HashMap<&str, &TableSnapshot> =
            desired.iter().map(|t| (t.name.as_str(), t)).collect();

        let mut diffs = Vec::new();

        for name in union_names(
            actual.iter().map(|t| t.name.as_str()),
            desired.iter().map(|t| t.name.as_str()),
        ) {
            match (actual_map.get(name), desired_map.get(name)) {
                (Some(actual_table), None) => diffs.push(TableDiff {
                    table: name.to_string(),
                    schema: actual_table.schema.clone(),
                    new_table: false,
                    columns: vec![ColumnDiff::new(DiffAction::Delete, WHOLE_TABLE)],
                }),
                (None, Some(desired_table)) => {
                    let mut columns: Vec<ColumnDiff> =
                        desired_table.columns.iter().map(create_column).collect();
                    diff_indexes(&[], &desired_table.indexes, &mut columns);

                    diffs.push(TableDiff {
                        table: name.to_string(),
                        schema: desired_table.schema.clone(),
                        new_table: true,
                        columns,
                    });
                }
                (Some(actual_table), Some(desired_table)) => {
                    let columns = self.diff_table(actual_table, desired_table);
                    if !columns.is_empty() {
                        diffs.push(TableDiff {
                            table: name.to_string(),
                            schema: desired_table.schema.clone(),
                            new_table: false,
                            columns,
                        });
                    }
                }
                (None, None) => {}
            }
        }

        Ok(diffs)
    }

    fn diff_table(&self, actual: &TableSnapshot, desired: &TableSnapshot) -> Vec<ColumnDiff> {
        let mut out = Vec::new();

        for name in union_names(
            actual.columns.iter().map(|c| c.name.as_str()),
            desired.columns.iter().map(|c| c.name.as_str()),
        ) {
            match (actual.get_column(name), desired.get_column(name)) {
                (Some(_), None) => out.push(ColumnDiff::new(DiffAction::Delete, name)),
                (None, Some(desired_col)) => out.push(create_column(desired_col)),
                (Some(actual_col), Some(desired_col)) => {
                    self.diff_column(actual_col, desired_col, &mut out)
                }
                (None, None) => {}
            }
        }

        diff_indexes(&actual.indexes, &desired.indexes, &mut out);
        out
    }

    fn diff_column(&self, actual: &ColumnInfo, desired: &ColumnInfo, out: &mut Vec<ColumnDiff>) {
        let actual = NormalizedColumn::new(actual, self.dialect);

        let rescaled = precision_and_scale_change(&actual, desired);

        diff_foreign_keys(&actual, desired, out);
        let enum_retyped = diff_enum(&actual, desired, out);
        let retyped = self.diff_type(&actual, desired, out);
        // Every type alteration drops the default and restores the desired one.
        if !(enum_retyped || retyped || rescaled.is_some()) {
            diff_default(&actual, desired, out);
        }
        diff_primary(&actual, desired, out);
        diff_unique(&actual, desired, out);
        diff_nullable(&actual, desired, out);
        if let Some((precision, scale)) = rescaled {
            diff_precision_and_scale(desired, precision, scale, out);
        }
    }

    fn diff_type(&self, actual: &NormalizedColumn<'_>, desired: &ColumnInfo, out: &mut Vec<ColumnDiff>) -> bool {
        let canonical = canonicalize(&desired.column_type);
        let length = self.desired_length(actual, desired, canonical);

        if actual.column_type.contains(canonical.name) && actual.length == length {
            return false;
        }

        let mut diff = ColumnDiff::alter(
            &desired.name,
            ColumnChanges {
                default: desired.default.clone().map(ColumnDefault::Set),
                enum_items: desired.items().map(<[String]>::to_vec),
                precision: desired.precision,
                scale: desired.scale,
                ..Default::default()
            },
        );
        diff.column_type = Some(canonical.name.to_string());
        diff.length = length;
        diff.drop_check = actual.is_check_enum();
        out.push(diff);
        true
    }

    fn desired_length(
        &self,
        actual: &NormalizedColumn<'_>,
        desired: &ColumnInfo,
        canonical: CanonicalType,
    ) -> Option<u32> {
        if !self.dialect.is_postgres() {
            return desired.length.or(canonical.length);
        }
        if canonical.name == types::INTEGER {
            return Some(types::POSTGRES_INTEGER_LENGTH);
        }
        if actual.raw.is_decimal && canonical.is_decimal() {
            return Some(actual.raw.precision.unwrap_or(0));
        }
        desired.length.or(canonical.length)
    }
}

/// Compute the changes needed to turn `actual` into `desired`.
pub fn compute_diff(
    actual: &[TableSnapshot],
    desired: &[TableSnapshot],
    dialect: Dialect,
) -> MigrateResult<Vec<TableDiff>> {
    SchemaDiffer::new(dialect).diff(actual, desired)
}

/// Names of both sides, first side's order first, without duplicates.
fn union_names<'a>(
    first: impl Iterator<Item = &'a str>,
    second: impl Iterator<Item = &'a str>,
) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    first.chain(second).filter(|name| seen.insert(*name)).collect()
}

fn create_column(column: &ColumnInfo) -> ColumnDiff {
    let canonical = canonicalize(&column.column_type);

    let mut diff = ColumnDiff::new(DiffAction::Create, &column.name);
    diff.column_type = Some(canonical.name.to_string());
    diff.length = column.length.or(canonical.length);
    diff.changes = Some(ColumnChanges {
        auto_increment: column.auto_increment,
        default: column.default.clone().map(ColumnDefault::Set),
        primary: column.primary,
        unique: column.unique,
        nullable: column.nullable,
        enum_items: column.items().map(<[String]>::to_vec),
        foreign_keys: (!column.foreign_keys.is_empty()).then(|| column.foreign_keys.clone()),
        precision: column.precision,
        scale: column.scale,
    });
    diff
}

fn diff_foreign_keys(actual: &NormalizedColumn<'_>, desired: &ColumnInfo, out: &mut Vec<ColumnDiff>) {
    let actual_keys: HashSet<String> = actual.raw.foreign_keys.iter().map(ForeignKeyRef::key).collect();
    let desired_keys: HashSet<String> = desired.foreign_keys.iter().map(ForeignKeyRef::key).collect();

    if actual_keys == desired_keys {
        return;
    }

    out.push(ColumnDiff::alter(
        &desired.name,
        ColumnChanges {
            foreign_keys: Some(desired.foreign_keys.clone()),
            ..Default::default()
        },
    ));
}

/// Returns whether a type alteration was pushed.
fn diff_enum(actual: &NormalizedColumn<'_>, desired: &ColumnInfo, out: &mut Vec<ColumnDiff>) -> bool {
    match (actual.raw.items(), desired.items()) {
        (Some(actual_items), Some(desired_items)) => {
            let actual_set: HashSet<&String> = actual_items.iter().collect();
            let desired_set: HashSet<&String> = desired_items.iter().collect();
            if actual_set == desired_set {
                return false;
            }

            let mut diff = ColumnDiff::alter(
                &desired.name,
                ColumnChanges {
                    default: desired.default.clone().map(ColumnDefault::Set),
                    enum_items: Some(desired_items.to_vec()),
                    ..Default::default()
                },
            );
            diff.column_type = Some(types::ENUM.to_string());
            diff.drop_check = actual.is_check_enum();
            out.push(diff);
            true
        }
        (None, Some(desired_items)) => {
            let mut diff = ColumnDiff::new(DiffAction::Create, &desired.name);
            diff.changes = Some(ColumnChanges {
                enum_items: Some(desired_items.to_vec()),
                ..Default::default()
            });
            out.push(diff);
            false
        }
        // Dropping the items is handled by the type diff.
        (Some(_), None) | (None, None) => false,
    }
}

fn diff_default(actual: &NormalizedColumn<'_>, desired: &ColumnInfo, out: &mut Vec<ColumnDiff>) {
    if actual.raw.default == desired.default {
        return;
    }

    let default = match &desired.default {
        Some(value) => ColumnDefault::Set(value.clone()),
        None => ColumnDefault::Drop,
    };
    out.push(ColumnDiff::alter(
        &desired.name,
        ColumnChanges {
            default: Some(default),
            ..Default::default()
        },
    ));
}

fn diff_primary(actual: &NormalizedColumn<'_>, desired: &ColumnInfo, out: &mut Vec<ColumnDiff>) {
    if actual.raw.is_primary() == desired.is_primary() {
        return;
    }

    out.push(ColumnDiff::alter(
        &desired.name,
        ColumnChanges {
            primary: Some(desired.is_primary()),
            ..Default::default()
        },
    ));
}

fn diff_unique(actual: &NormalizedColumn<'_>, desired: &ColumnInfo, out: &mut Vec<ColumnDiff>) {
    if actual.raw.is_unique() == desired.is_unique() || desired.is_primary() {
        return;
    }

    out.push(ColumnDiff::alter(
        &desired.name,
        ColumnChanges {
            unique: Some(desired.is_unique()),
            ..Default::default()
        },
    ));
}

fn diff_nullable(actual: &NormalizedColumn<'_>, desired: &ColumnInfo, out: &mut Vec<ColumnDiff>) {
    if actual.raw.is_nullable() == desired.is_nullable() {
        return;
    }

    out.push(ColumnDiff::alter(
        &desired.name,
        ColumnChanges {
            nullable: Some(desired.is_nullable()),
            ..Default::default()
        },
    ));
}

/// New precision and scale of a decimal column, when either changes.
fn precision_and_scale_change(actual: &NormalizedColumn<'_>, desired: &ColumnInfo) -> Option<(u32, u32)> {
    if !actual.raw.is_decimal || !canonicalize(&desired.column_type).is_decimal() {
        return None;
    }

    let actual_precision = actual.raw.precision.unwrap_or(0);
    let actual_scale = actual.raw.scale.unwrap_or(0);
    let precision = desired.precision.unwrap_or(actual_precision);
    let scale = desired.scale.unwrap_or(actual_scale);

    if precision == actual_precision && scale == actual_scale {
        return None;
    }
    Some((precision, scale))
}

fn diff_precision_and_scale(desired: &ColumnInfo, precision: u32, scale: u32, out: &mut Vec<ColumnDiff>) {
    let mut diff = ColumnDiff::alter(
        &desired.name,
        ColumnChanges {
            default: desired.default.clone().map(ColumnDefault::Set),
            precision: Some(precision),
            scale: Some(scale),
            ..Default::default()
        },
    );
    diff.column_type = Some(types::DECIMAL.to_string());
    diff.length = desired.length;
    out.push(diff);
}

fn diff_indexes(actual: &[IndexInfo], desired: &[IndexInfo], out: &mut Vec<ColumnDiff>) {
    if actual.is_empty() && desired.is_empty() {
        return;
    }
    if actual.is_empty() {
        out.push(ColumnDiff::index(
            ALL_INDEXES,
            desired.iter().map(IndexTarget::create).collect(),
        ));
        return;
    }
    if desired.is_empty() {
        out.push(ColumnDiff::index(
            ALL_INDEXES,
            actual.iter().map(IndexTarget::drop).collect(),
        ));
        return;
    }

    for name in union_names(
        actual.iter().map(|i| i.name.as_str()),
        desired.iter().map(|i| i.name.as_str()),
    ) {
        match (find_index(actual, name), find_index(desired, name)) {
            (Some(existing), None) => {
                out.push(ColumnDiff::index(
                    existing.columns.join(","),
                    vec![IndexTarget::drop(existing)],
                ));
            }
            (None, Some(wanted)) => {
                out.push(ColumnDiff::index(
                    wanted.columns.join(","),
                    vec![IndexTarget::create(wanted)],
                ));
            }
            (Some(existing), Some(wanted)) if existing.columns != wanted.columns => {
                out.push(ColumnDiff::index(
                    wanted.columns.join(","),
                    vec![IndexTarget::drop(existing), IndexTarget::create(wanted)],
                ));
            }
            _ => {}
        }
    }
}

fn find_index<'a>(indexes: &'a [IndexInfo], name: &str) -> Option<&'a IndexInfo> {
    indexes.iter().find(|i| i.name == name)
}
