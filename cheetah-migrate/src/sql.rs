//! DDL synthesis.
//!
//! Turns table diffs into ordered statements. Statement text is part of the
//! migration file format and constraint names are looked up again on later
//! diffs, so the formatting here must stay stable.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diff::{ColumnChanges, ColumnDefault, ColumnDiff, DiffAction, TableDiff, WHOLE_TABLE};
use crate::snapshot::ForeignKeyRef;
use crate::types::{self, Dialect};

/// Structural tag of a statement, used by the redundancy filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    /// Drops an index that depends on `columns`.
    DropIndex {
        /// Table owning the index.
        table: String,
        /// Columns the index depends on.
        columns: Vec<String>,
    },
    /// Drops a column.
    DropColumn {
        /// Table owning the column.
        table: String,
        /// Dropped column.
        column: String,
    },
    /// Any other statement.
    Other,
}

/// A synthesized SQL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Statement text, terminated by `;`.
    pub sql: String,
    /// Structural tag.
    pub kind: StatementKind,
}

impl Statement {
    fn new(sql: impl Into<String>, kind: StatementKind) -> Self {
        let mut sql = sql.into();
        sql.push(';');
        Self { sql, kind }
    }

    fn other(sql: impl Into<String>) -> Self {
        Self::new(sql, StatementKind::Other)
    }

    /// Statement text.
    pub fn as_str(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Statements of an existing table, grouped by emission order.
#[derive(Default)]
struct AlterBuckets {
    /// Column definitions for one combined `add column` statement.
    added: Vec<String>,
    /// Column type alterations.
    altered: Vec<Statement>,
    /// Table-level operations in diff order.
    trailing: Vec<Statement>,
}

/// DDL generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlGenerator {
    dialect: Dialect,
}

impl SqlGenerator {
    /// Create a generator for a dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Generate statements for a list of table diffs.
    pub fn generate(&self, diffs: &[TableDiff]) -> Vec<Statement> {
        let mut statements = Vec::new();
        for diff in diffs {
            if diff.new_table {
                statements.extend(self.create_table(diff));
            } else {
                statements.extend(self.alter_table(diff));
            }
        }
        statements
    }

    fn create_table(&self, diff: &TableDiff) -> Vec<Statement> {
        let table = qualified(&diff.schema, &diff.table);
        let mut definitions = Vec::new();
        let mut primary = Vec::new();
        let mut trailing = Vec::new();

        for col in &diff.columns {
            if col.action == DiffAction::Index {
                for target in col.indexes.iter().filter(|t| !is_primary_index(&t.name)) {
                    if let Some(columns) = &target.columns {
                        trailing.push(create_index(&target.name, &table, columns));
                    }
                }
                continue;
            }

            let changes = col.changes();

            if let Some(foreign_keys) = &changes.foreign_keys {
                for fk in foreign_keys {
                    trailing.push(add_foreign_key(&table, &diff.table, &col.column, fk));
                }
            }

            if let Some(column_type) = &col.column_type {
                definitions.push(self.column_definition(col, column_type, &changes));
                if changes.primary == Some(true) && changes.auto_increment != Some(true) {
                    primary.push(ident(&col.column));
                }
            }

            if changes.unique == Some(true) {
                trailing.push(add_unique(&table, &diff.table, &col.column));
            }
        }

        if !primary.is_empty() {
            definitions.push(format!(
                "constraint {} primary key ({})",
                ident(&primary_key_name(&diff.table)),
                primary.join(", ")
            ));
        }

        let mut statements = vec![Statement::other(format!(
            "create table {} ({})",
            table,
            definitions.join(", ")
        ))];
        statements.extend(trailing);
        statements
    }

    fn alter_table(&self, diff: &TableDiff) -> Vec<Statement> {
        let table = qualified(&diff.schema, &diff.table);
        let mut buckets = AlterBuckets::default();

        for col in &diff.columns {
            // (a) indexes
            if col.action == DiffAction::Index {
                for target in col.indexes.iter().filter(|t| !is_primary_index(&t.name)) {
                    let statement = match &target.columns {
                        Some(columns) => create_index(&target.name, &table, columns),
                        None => Statement::new(
                            format!("drop index {}", qualified(&diff.schema, &target.name)),
                            StatementKind::DropIndex {
                                table: diff.table.clone(),
                                columns: target.dependent_columns.clone(),
                            },
                        ),
                    };
                    buckets.trailing.push(statement);
                }
                continue;
            }

            // (b) drops
            if col.action == DiffAction::Delete {
                if col.column == WHOLE_TABLE {
                    buckets.trailing.push(Statement::other(format!("drop table {table}")));
                } else {
                    buckets.trailing.push(Statement::new(
                        format!("alter table {} drop column {}", table, ident(&col.column)),
                        StatementKind::DropColumn {
                            table: diff.table.clone(),
                            column: col.column.clone(),
                        },
                    ));
                }
                continue;
            }

            let changes = col.changes();

            // (c) unique
            match changes.unique {
                Some(true) => buckets.trailing.push(add_unique(&table, &diff.table, &col.column)),
                Some(false) => buckets.trailing.push(drop_constraint(
                    &table,
                    &unique_key_name(&diff.table, &col.column),
                )),
                None => {}
            }

            // (d) foreign keys
            if let Some(foreign_keys) = &changes.foreign_keys {
                let name = foreign_key_name(&diff.table, &col.column);
                if foreign_keys.is_empty() {
                    buckets.trailing.push(drop_constraint(&table, &name));
                } else {
                    if col.action == DiffAction::Alter {
                        buckets.trailing.push(Statement::other(format!(
                            "alter table {} drop constraint if exists {}",
                            table,
                            ident(&name)
                        )));
                    }
                    for fk in foreign_keys {
                        buckets
                            .trailing
                            .push(add_foreign_key(&table, &diff.table, &col.column, fk));
                    }
                }
            }

            // (e) add or alter
            match col.action {
                DiffAction::Create => self.add_column(&table, diff, col, &changes, &mut buckets),
                DiffAction::Alter => self.alter_column(&table, diff, col, &changes, &mut buckets),
                DiffAction::Delete | DiffAction::Index => {}
            }
        }

        let mut statements = Vec::new();
        if !buckets.added.is_empty() {
            statements.push(Statement::other(format!(
                "alter table {} {}",
                table,
                buckets.added.join(", ")
            )));
        }
        statements.extend(buckets.altered);
        statements.extend(buckets.trailing);
        statements
    }

    fn add_column(
        &self,
        table: &str,
        diff: &TableDiff,
        col: &ColumnDiff,
        changes: &ColumnChanges,
        buckets: &mut AlterBuckets,
    ) {
        // Enum items without a type are applied by the type alteration.
        let Some(column_type) = &col.column_type else {
            return;
        };

        buckets.added.push(format!(
            "add column {}",
            self.column_definition(col, column_type, changes)
        ));

        if changes.primary == Some(true) && changes.auto_increment != Some(true) {
            buckets.trailing.push(add_primary_key(table, &diff.table, &col.column));
        }
    }

    fn alter_column(
        &self,
        table: &str,
        diff: &TableDiff,
        col: &ColumnDiff,
        changes: &ColumnChanges,
        buckets: &mut AlterBuckets,
    ) {
        let column = ident(&col.column);
        let alter = |action: String| Statement::other(format!("alter table {table} alter column {column} {action}"));

        match &col.column_type {
            Some(column_type) => {
                let rendered = self.render_type(column_type, col.length, changes);

                buckets.altered.push(alter("drop default".to_string()));
                buckets
                    .altered
                    .push(alter(format!("type {rendered} using ({column}::{rendered})")));
                if let Some(ColumnDefault::Set(value)) = &changes.default {
                    buckets.altered.push(alter(format!("set default {value}")));
                }
                if let Some(nullable) = changes.nullable {
                    buckets.altered.push(alter(nullability(nullable).to_string()));
                }

                if col.drop_check {
                    for name in [check_name(&col.column), format!("{}_{}_check", diff.table, col.column)] {
                        buckets.trailing.push(Statement::other(format!(
                            "alter table {} drop constraint if exists {}",
                            table,
                            ident(&name)
                        )));
                    }
                }
                if let (types::ENUM, Some(items)) = (column_type.as_str(), &changes.enum_items) {
                    buckets.trailing.push(Statement::other(format!(
                        "alter table {} add constraint {} check({} in ({}))",
                        table,
                        check_name(&col.column),
                        column,
                        literal_list(items, ",")
                    )));
                }
            }
            None => {
                if let Some(nullable) = changes.nullable {
                    buckets.trailing.push(alter(nullability(nullable).to_string()));
                }
                match &changes.default {
                    Some(ColumnDefault::Set(value)) => {
                        buckets.trailing.push(alter(format!("set default {value}")))
                    }
                    Some(ColumnDefault::Drop) => buckets.trailing.push(alter("drop default".to_string())),
                    None => {}
                }
            }
        }

        match changes.primary {
            Some(true) => buckets.trailing.push(add_primary_key(table, &diff.table, &col.column)),
            Some(false) => buckets
                .trailing
                .push(drop_constraint(table, &primary_key_name(&diff.table))),
            None => {}
        }
    }

    /// Inline column definition for `create table` and `add column`.
    fn column_definition(&self, col: &ColumnDiff, column_type: &str, changes: &ColumnChanges) -> String {
        let name = ident(&col.column);

        if changes.auto_increment == Some(true) {
            return match changes.primary {
                Some(false) => format!("{name} serial"),
                _ => format!("{name} serial primary key"),
            };
        }

        let mut definition = format!("{} {}", name, self.render_type(column_type, col.length, changes));

        if column_type == types::ENUM {
            let items = changes.enum_items.as_deref().unwrap_or_default();
            definition.push_str(&format!(" check ({} in ({}))", name, literal_list(items, ", ")));
        }

        definition.push(' ');
        definition.push_str(if changes.nullable == Some(true) { "null" } else { "not null" });

        if let Some(ColumnDefault::Set(value)) = &changes.default {
            definition.push_str(&format!(" default {value}"));
        }

        definition
    }

    /// Render a canonical type as column DDL.
    fn render_type(&self, column_type: &str, length: Option<u32>, changes: &ColumnChanges) -> String {
        match column_type {
            types::INTEGER | "int" => "integer".to_string(),
            types::BIGINT => "bigint".to_string(),
            types::DECIMAL | "numeric" | "float" | "double" => format!(
                "decimal({}, {})",
                changes.precision.unwrap_or(8),
                changes.scale.unwrap_or(2)
            ),
            types::TEXT | types::ENUM => "text".to_string(),
            types::BOOLEAN => "boolean".to_string(),
            types::TIMESTAMP => {
                let base = if self.dialect.is_postgres() { "timestamptz" } else { "timestamp" };
                match length {
                    Some(precision) => format!("{base}({precision})"),
                    None => base.to_string(),
                }
            }
            types::JSON => "json".to_string(),
            "jsonb" => "jsonb".to_string(),
            types::UUID => "uuid".to_string(),
            _ => format!("varchar({})", length.unwrap_or(255)),
        }
    }
}

/// Generate statements for a list of table diffs.
pub fn synthesize(diffs: &[TableDiff], dialect: Dialect) -> Vec<Statement> {
    SqlGenerator::new(dialect).generate(diffs)
}

/// Quote an identifier.
pub fn ident(name: &str) -> String {
    format!("\"{}\"", name.to_lowercase().replace('"', "\"\""))
}

/// Quote a schema-qualified name.
pub fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", ident(schema), ident(name))
}

/// Quote a string literal.
pub fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn literal_list(items: &[String], separator: &str) -> String {
    items.iter().map(|i| literal(i)).collect::<Vec<_>>().join(separator)
}

fn nullability(nullable: bool) -> &'static str {
    if nullable { "drop not null" } else { "set not null" }
}

fn is_primary_index(name: &str) -> bool {
    name.contains("pkey")
}

fn unique_key_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_key")
}

fn foreign_key_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_fk")
}

fn primary_key_name(table: &str) -> String {
    format!("{table}_pkey")
}

fn check_name(column: &str) -> String {
    format!("{}_check", column.to_lowercase())
}

fn create_index(name: &str, table: &str, columns: &[String]) -> Statement {
    let columns: Vec<String> = columns.iter().map(|c| ident(c)).collect();
    Statement::other(format!(
        "create index {} on {} ({})",
        ident(name),
        table,
        columns.join(", ")
    ))
}

fn add_unique(table: &str, table_name: &str, column: &str) -> Statement {
    Statement::other(format!(
        "alter table {} add constraint {} unique ({})",
        table,
        ident(&unique_key_name(table_name, column)),
        ident(column)
    ))
}

fn add_foreign_key(table: &str, table_name: &str, column: &str, fk: &ForeignKeyRef) -> Statement {
    Statement::other(format!(
        "alter table {} add constraint {} foreign key ({}) references {} ({})",
        table,
        ident(&foreign_key_name(table_name, column)),
        ident(column),
        ident(&fk.table),
        ident(&fk.column)
    ))
}

fn add_primary_key(table: &str, table_name: &str, column: &str) -> Statement {
    Statement::other(format!(
        "alter table {} add constraint {} primary key ({})",
        table,
        ident(&primary_key_name(table_name)),
        ident(column)
    ))
}

fn drop_constraint(table: &str, name: &str) -> Statement {
    Statement::other(format!("alter table {} drop constraint {}", table, ident(name)))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::diff::{IndexTarget, compute_diff};
    use crate::snapshot::{ColumnInfo, IndexInfo, TableSnapshot};

    fn sql(statements: &[Statement]) -> Vec<&str> {
        statements.iter().map(Statement::as_str).collect()
    }

    fn plan(actual: &[TableSnapshot], desired: &[TableSnapshot]) -> Vec<Statement> {
        let diffs = compute_diff(actual, desired, Dialect::Postgres).unwrap();
        synthesize(&diffs, Dialect::Postgres)
    }

    #[test]
    fn test_ident() {
        assert_eq!(ident("User"), "\"user\"");
        assert_eq!(qualified("public", "user"), "\"public\".\"user\"");
        assert_eq!(literal("o'brien"), "'o''brien'");
    }

    #[test]
    fn test_create_table_with_unique() {
        let desired = vec![
            TableSnapshot::new("user")
                .column(ColumnInfo::new("id", "Number").primary(true))
                .column(ColumnInfo::new("email", "String").unique(true)),
        ];

        assert_eq!(
            sql(&plan(&[], &desired)),
            vec![
                "create table \"public\".\"user\" (\"id\" integer not null, \"email\" varchar(255) not null, constraint \"user_pkey\" primary key (\"id\"));",
                "alter table \"public\".\"user\" add constraint \"user_email_key\" unique (\"email\");",
            ]
        );
    }

    #[test]
    fn test_create_table_auto_increment() {
        let desired = vec![
            TableSnapshot::new("user")
                .column(ColumnInfo::new("id", "Number").primary(true).auto_increment(true))
                .column(ColumnInfo::new("email", "text")),
        ];

        assert_eq!(
            sql(&plan(&[], &desired)),
            vec!["create table \"public\".\"user\" (\"id\" serial primary key, \"email\" text not null);"]
        );
    }

    #[test]
    fn test_create_table_with_enum() {
        let desired = vec![
            TableSnapshot::new("user")
                .column(ColumnInfo::new("id", "Number").primary(true).auto_increment(true))
                .column(ColumnInfo::new("role", "enum").enum_items(["admin", "user"])),
        ];

        assert_eq!(
            sql(&plan(&[], &desired)),
            vec![
                "create table \"public\".\"user\" (\"id\" serial primary key, \"role\" text check (\"role\" in ('admin', 'user')) not null);"
            ]
        );
    }

    #[test]
    fn test_create_table_decimal_and_timestamp() {
        let desired = vec![
            TableSnapshot::new("user")
                .column(ColumnInfo::new("id", "Number").primary(true).auto_increment(true))
                .column(ColumnInfo::new("created_at", "Date").length(3))
                .column(ColumnInfo::new("money", "decimal").numeric(Some(4), Some(2)).decimal())
                .column(ColumnInfo::new("price", "float").numeric(Some(10), None).decimal()),
        ];

        assert_eq!(
            sql(&plan(&[], &desired)),
            vec![
                "create table \"public\".\"user\" (\"id\" serial primary key, \"created_at\" timestamptz(3) not null, \"money\" decimal(4, 2) not null, \"price\" decimal(10, 2) not null);"
            ]
        );
    }

    #[test]
    fn test_create_table_skips_primary_key_index() {
        let desired = vec![
            TableSnapshot::new("user")
                .column(ColumnInfo::new("id", "Number").primary(true))
                .column(ColumnInfo::new("email", "String"))
                .index(IndexInfo::new("user_pkey", ["id"]))
                .index(IndexInfo::new("id_email_index", ["id", "email"]))
                .index(IndexInfo::new("email_index", ["email"])),
        ];

        assert_eq!(
            sql(&plan(&[], &desired)),
            vec![
                "create table \"public\".\"user\" (\"id\" integer not null, \"email\" varchar(255) not null, constraint \"user_pkey\" primary key (\"id\"));",
                "create index \"id_email_index\" on \"public\".\"user\" (\"id\", \"email\");",
                "create index \"email_index\" on \"public\".\"user\" (\"email\");",
            ]
        );
    }

    #[test]
    fn test_create_table_with_foreign_key() {
        let desired = vec![
            TableSnapshot::new("address")
                .column(ColumnInfo::new("id", "Number").primary(true))
                .column(ColumnInfo::new("user_id", "Number").references("user", "id")),
        ];

        assert_eq!(
            sql(&plan(&[], &desired)),
            vec![
                "create table \"public\".\"address\" (\"id\" integer not null, \"user_id\" integer not null, constraint \"address_pkey\" primary key (\"id\"));",
                "alter table \"public\".\"address\" add constraint \"address_user_id_fk\" foreign key (\"user_id\") references \"user\" (\"id\");",
            ]
        );
    }

    #[test]
    fn test_drop_table() {
        let actual = vec![TableSnapshot::new("legacy").column(ColumnInfo::new("id", "integer"))];
        assert_eq!(sql(&plan(&actual, &[])), vec!["drop table \"public\".\"legacy\";"]);
    }

    #[test]
    fn test_attribute_only_changes() {
        let actual = vec![
            TableSnapshot::new("user")
                .column(ColumnInfo::new("id", "integer").length(32))
                .column(ColumnInfo::new("status", "text").nullable(true)),
        ];
        let desired = vec![
            TableSnapshot::new("user")
                .column(ColumnInfo::new("id", "Number").primary(true))
                .column(ColumnInfo::new("status", "text").default_value("'active'")),
        ];

        assert_eq!(
            sql(&plan(&actual, &desired)),
            vec![
                "alter table \"public\".\"user\" add constraint \"user_pkey\" primary key (\"id\");",
                "alter table \"public\".\"user\" alter column \"status\" set default 'active';",
                "alter table \"public\".\"user\" alter column \"status\" set not null;",
            ]
        );
    }

    #[test]
    fn test_type_change_keeps_default() {
        let actual = vec![
            TableSnapshot::new("user").column(
                ColumnInfo::new("status", "character varying")
                    .length(20)
                    .default_value("'active'"),
            ),
        ];
        let desired = vec![
            TableSnapshot::new("user")
                .column(ColumnInfo::new("status", "String").length(40).default_value("'active'")),
        ];

        assert_eq!(
            sql(&plan(&actual, &desired)),
            vec![
                "alter table \"public\".\"user\" alter column \"status\" drop default;",
                "alter table \"public\".\"user\" alter column \"status\" type varchar(40) using (\"status\"::varchar(40));",
                "alter table \"public\".\"user\" alter column \"status\" set default 'active';",
            ]
        );
    }

    #[test]
    fn test_check_enum_values_replaced() {
        let actual = vec![
            TableSnapshot::new("user").column(ColumnInfo::new("role", "enum").enum_items(["admin", "user"])),
        ];
        let desired = vec![
            TableSnapshot::new("user").column(ColumnInfo::new("role", "enum").enum_items(["admin", "guest"])),
        ];

        assert_eq!(
            sql(&plan(&actual, &desired)),
            vec![
                "alter table \"public\".\"user\" alter column \"role\" drop default;",
                "alter table \"public\".\"user\" alter column \"role\" type text using (\"role\"::text);",
                "alter table \"public\".\"user\" drop constraint if exists \"role_check\";",
                "alter table \"public\".\"user\" drop constraint if exists \"user_role_check\";",
                "alter table \"public\".\"user\" add constraint role_check check(\"role\" in ('admin','guest'));",
            ]
        );
    }

    #[test]
    fn test_foreign_key_replaced() {
        let actual = vec![
            TableSnapshot::new("address")
                .column(ColumnInfo::new("owner", "integer").length(32).references("user", "id")),
        ];
        let desired = vec![
            TableSnapshot::new("address")
                .column(ColumnInfo::new("owner", "Number").references("account", "id")),
        ];

        assert_eq!(
            sql(&plan(&actual, &desired)),
            vec![
                "alter table \"public\".\"address\" drop constraint if exists \"address_owner_fk\";",
                "alter table \"public\".\"address\" add constraint \"address_owner_fk\" foreign key (\"owner\") references \"account\" (\"id\");",
            ]
        );
    }

    #[test]
    fn test_drop_index_is_tagged() {
        let diff = TableDiff {
            table: "user".to_string(),
            schema: "public".to_string(),
            new_table: false,
            columns: vec![ColumnDiff {
                action: DiffAction::Index,
                column: "token".to_string(),
                column_type: None,
                length: None,
                changes: None,
                indexes: vec![IndexTarget::drop(&IndexInfo::new("token_index", ["token"]))],
                drop_check: false,
            }],
        };

        let statements = synthesize(&[diff], Dialect::Postgres);
        assert_eq!(statements[0].sql, "drop index \"public\".\"token_index\";");
        assert_eq!(
            statements[0].kind,
            StatementKind::DropIndex {
                table: "user".to_string(),
                columns: vec!["token".to_string()],
            }
        );
    }

    #[test]
    fn test_generic_dialect_timestamp() {
        let desired = vec![TableSnapshot::new("event").column(ColumnInfo::new("at", "Date"))];
        let diffs = compute_diff(&[], &desired, Dialect::Generic).unwrap();

        assert_eq!(
            sql(&synthesize(&diffs, Dialect::Generic)),
            vec!["create table \"public\".\"event\" (\"at\" timestamp not null);"]
        );
    }
}
