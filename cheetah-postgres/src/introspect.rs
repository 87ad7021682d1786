//! Live schema introspection through `information_schema` and `pg_catalog`.

use std::collections::BTreeMap;

use cheetah_migrate::sql::literal;
use cheetah_migrate::types::{self, POSTGRES_INTEGER_LENGTH};
use cheetah_migrate::{
    ColumnInfo, DatabaseIntrospector, ForeignKeyRef, IndexInfo, MigrateResult, MigrationError,
    SqlGateway, SqlRow, TableSnapshot,
};
use regex_lite::Regex;
use tracing::debug;

/// Reads table snapshots from a live PostgreSQL database.
pub struct PgIntrospector<G: SqlGateway> {
    gateway: G,
}

impl<G: SqlGateway> PgIntrospector<G> {
    /// Create an introspector over a gateway.
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    async fn rows(&self, table: &str, sql: String) -> MigrateResult<Vec<SqlRow>> {
        self.gateway
            .query(&sql)
            .await
            .map_err(|err| MigrationError::snapshot_unavailable(table, err.to_string()))
    }
}

#[async_trait::async_trait]
impl<G: SqlGateway> DatabaseIntrospector for PgIntrospector<G> {
    async fn snapshot(&self, table: &str, schema: &str) -> MigrateResult<Option<TableSnapshot>> {
        let column_rows = self.rows(table, columns_sql(table, schema)).await?;
        if column_rows.is_empty() {
            return Ok(None);
        }

        let mut snapshot = TableSnapshot::new(table).schema(schema);
        for row in &column_rows {
            snapshot.columns.push(column_from_row(row));
        }

        for row in self.rows(table, constraints_sql(table, schema)).await? {
            apply_constraint(&mut snapshot, &row);
        }

        for row in self.rows(table, checks_sql(table, schema)).await? {
            let (Some(column), Some(definition)) = (text(&row, "column_name"), text(&row, "definition"))
            else {
                continue;
            };
            if let (Some(items), Some(col)) = (check_items(&definition), column_mut(&mut snapshot, &column)) {
                col.column_type = types::ENUM.to_string();
                col.enum_items = Some(items);
            }
        }

        for row in self.rows(table, enum_labels_sql(table, schema)).await? {
            let (Some(column), Some(label)) = (text(&row, "column_name"), text(&row, "label")) else {
                continue;
            };
            if let Some(col) = column_mut(&mut snapshot, &column) {
                col.enum_items.get_or_insert_with(Vec::new).push(label);
            }
        }

        let mut indexes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in self.rows(table, indexes_sql(table, schema)).await? {
            if let (Some(name), Some(column)) = (text(&row, "index_name"), text(&row, "column_name")) {
                indexes.entry(name).or_default().push(column);
            }
        }
        snapshot.indexes = indexes
            .into_iter()
            .map(|(name, columns)| IndexInfo::new(name, columns))
            .collect();

        debug!(
            table = %table,
            columns = snapshot.columns.len(),
            indexes = snapshot.indexes.len(),
            "Introspected table"
        );
        Ok(Some(snapshot))
    }
}

fn columns_sql(table: &str, schema: &str) -> String {
    format!(
        "SELECT c.column_name, c.data_type, c.character_maximum_length, c.numeric_precision, \
         c.numeric_scale, c.is_nullable, c.column_default, c.is_identity, \
         CASE WHEN a.atttypmod >= 0 THEN a.atttypmod END AS typmod \
         FROM information_schema.columns c \
         JOIN pg_catalog.pg_namespace n ON n.nspname = c.table_schema \
         JOIN pg_catalog.pg_class t ON t.relnamespace = n.oid AND t.relname = c.table_name \
         JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name \
         WHERE c.table_schema = {} AND c.table_name = {} \
         ORDER BY c.ordinal_position",
        literal(schema),
        literal(table)
    )
}

fn constraints_sql(table: &str, schema: &str) -> String {
    format!(
        "SELECT con.contype AS kind, a.attname AS column_name, \
         array_length(con.conkey, 1) AS key_count, \
         frel.relname AS foreign_table, fa.attname AS foreign_column \
         FROM pg_catalog.pg_constraint con \
         JOIN pg_catalog.pg_class rel ON rel.oid = con.conrelid \
         JOIN pg_catalog.pg_namespace nsp ON nsp.oid = rel.relnamespace \
         JOIN pg_catalog.pg_attribute a ON a.attrelid = rel.oid AND a.attnum = ANY (con.conkey) \
         LEFT JOIN pg_catalog.pg_class frel ON frel.oid = con.confrelid \
         LEFT JOIN pg_catalog.pg_attribute fa ON fa.attrelid = con.confrelid \
         AND fa.attnum = con.confkey[array_position(con.conkey, a.attnum)] \
         WHERE con.contype IN ('p', 'u', 'f') AND nsp.nspname = {} AND rel.relname = {}",
        literal(schema),
        literal(table)
    )
}

fn checks_sql(table: &str, schema: &str) -> String {
    format!(
        "SELECT a.attname AS column_name, pg_catalog.pg_get_constraintdef(con.oid) AS definition \
         FROM pg_catalog.pg_constraint con \
         JOIN pg_catalog.pg_class rel ON rel.oid = con.conrelid \
         JOIN pg_catalog.pg_namespace nsp ON nsp.oid = rel.relnamespace \
         JOIN pg_catalog.pg_attribute a ON a.attrelid = rel.oid AND a.attnum = con.conkey[1] \
         WHERE con.contype = 'c' AND array_length(con.conkey, 1) = 1 \
         AND nsp.nspname = {} AND rel.relname = {}",
        literal(schema),
        literal(table)
    )
}

fn enum_labels_sql(table: &str, schema: &str) -> String {
    format!(
        "SELECT a.attname AS column_name, e.enumlabel AS label \
         FROM pg_catalog.pg_attribute a \
         JOIN pg_catalog.pg_class rel ON rel.oid = a.attrelid \
         JOIN pg_catalog.pg_namespace nsp ON nsp.oid = rel.relnamespace \
         JOIN pg_catalog.pg_enum e ON e.enumtypid = a.atttypid \
         WHERE nsp.nspname = {} AND rel.relname = {} \
         ORDER BY a.attnum, e.enumsortorder",
        literal(schema),
        literal(table)
    )
}

fn indexes_sql(table: &str, schema: &str) -> String {
    format!(
        "SELECT i.relname AS index_name, a.attname AS column_name \
         FROM pg_catalog.pg_index ix \
         JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid \
         JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
         JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid \
         JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) ON true \
         JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
         WHERE n.nspname = {} AND t.relname = {} \
         AND NOT EXISTS (SELECT 1 FROM pg_catalog.pg_constraint c \
         WHERE c.conindid = ix.indexrelid AND c.contype = 'u') \
         ORDER BY i.relname, k.ord",
        literal(schema),
        literal(table)
    )
}

fn text(row: &SqlRow, key: &str) -> Option<String> {
    row.get(key).cloned().flatten()
}

fn number(row: &SqlRow, key: &str) -> Option<u32> {
    row.get(key)?.as_deref()?.parse().ok()
}

fn column_mut<'a>(snapshot: &'a mut TableSnapshot, name: &str) -> Option<&'a mut ColumnInfo> {
    snapshot.columns.iter_mut().find(|c| c.name == name)
}

fn column_from_row(row: &SqlRow) -> ColumnInfo {
    let name = text(row, "column_name").unwrap_or_default();
    let data_type = text(row, "data_type").unwrap_or_default();

    let mut column = ColumnInfo::new(name, data_type.as_str())
        .nullable(text(row, "is_nullable").as_deref() == Some("YES"));

    match data_type.as_str() {
        types::INTEGER => column.length = Some(POSTGRES_INTEGER_LENGTH),
        types::VARCHAR => column.length = number(row, "character_maximum_length"),
        "numeric" => {
            column.is_decimal = true;
            column.precision = number(row, "numeric_precision");
            column.scale = number(row, "numeric_scale");
        }
        t if t.starts_with(types::TIMESTAMP) => column.length = number(row, "typmod"),
        _ => {}
    }

    let identity = text(row, "is_identity").as_deref() == Some("YES");
    match text(row, "column_default") {
        Some(default) if default.starts_with("nextval(") => column.auto_increment = Some(true),
        Some(default) => column.default = Some(strip_cast(&default).to_string()),
        None if identity => column.auto_increment = Some(true),
        None => {}
    }

    column
}

fn apply_constraint(snapshot: &mut TableSnapshot, row: &SqlRow) {
    let (Some(kind), Some(name)) = (text(row, "kind"), text(row, "column_name")) else {
        return;
    };
    let single = number(row, "key_count") == Some(1);
    let foreign = (text(row, "foreign_table"), text(row, "foreign_column"));
    let Some(column) = column_mut(snapshot, &name) else {
        return;
    };

    match (kind.as_str(), foreign) {
        ("p", _) => column.primary = Some(true),
        ("u", _) if single => column.unique = Some(true),
        ("f", (Some(table), Some(foreign_column))) => {
            column.foreign_keys.push(ForeignKeyRef::new(table, foreign_column));
        }
        _ => {}
    }
}

/// Drop a trailing `::type` cast from a column default.
fn strip_cast(default: &str) -> &str {
    match default.rfind("::") {
        Some(pos) if !default[pos..].contains('\'') => &default[..pos],
        _ => default,
    }
}

/// Items of a single-column `IN` list check, as rendered by `pg_get_constraintdef`.
fn check_items(definition: &str) -> Option<Vec<String>> {
    if !definition.contains("ARRAY[") && !definition.contains(" IN (") {
        return None;
    }
    let literal = Regex::new(r"'((?:[^']|'')*)'").ok()?;
    let items: Vec<String> = literal
        .captures_iter(definition)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().replace("''", "'"))
        .collect();
    (!items.is_empty()).then_some(items)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_strip_cast() {
        assert_eq!(strip_cast("'active'::character varying"), "'active'");
        assert_eq!(strip_cast("'a::b'::text"), "'a::b'");
        assert_eq!(strip_cast("now()"), "now()");
        assert_eq!(strip_cast("'x::y'"), "'x::y'");
    }

    #[test]
    fn test_check_items() {
        assert_eq!(
            check_items("CHECK (((role)::text = ANY ((ARRAY['admin'::character varying, 'user'::character varying])::text[])))"),
            Some(vec!["admin".to_string(), "user".to_string()])
        );
        assert_eq!(
            check_items("CHECK ((role = ANY (ARRAY['it''s'::text])))"),
            Some(vec!["it's".to_string()])
        );
        assert_eq!(check_items("CHECK ((price > (0)::numeric))"), None);
    }

    fn row(pairs: &[(&str, Option<&str>)]) -> SqlRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(String::from)))
            .collect()
    }

    /// Answers each catalog query by a marker it contains.
    struct CatalogGateway {
        answers: Vec<(&'static str, Vec<SqlRow>)>,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl SqlGateway for CatalogGateway {
        async fn execute(&self, _sql: &str) -> MigrateResult<u64> {
            Ok(0)
        }

        async fn query(&self, sql: &str) -> MigrateResult<Vec<SqlRow>> {
            self.queries.lock().unwrap().push(sql.to_string());
            Ok(self
                .answers
                .iter()
                .find(|(marker, _)| sql.contains(marker))
                .map(|(_, rows)| rows.clone())
                .unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_missing_table() {
        let introspector = PgIntrospector::new(CatalogGateway {
            answers: Vec::new(),
            queries: Mutex::new(Vec::new()),
        });
        assert!(introspector.snapshot("ghost", "public").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot() {
        let gateway = CatalogGateway {
            answers: vec![
                (
                    "information_schema.columns",
                    vec![
                        row(&[
                            ("column_name", Some("id")),
                            ("data_type", Some("integer")),
                            ("is_nullable", Some("NO")),
                            ("column_default", Some("nextval('user_id_seq'::regclass)")),
                        ]),
                        row(&[
                            ("column_name", Some("email")),
                            ("data_type", Some("character varying")),
                            ("character_maximum_length", Some("255")),
                            ("is_nullable", Some("NO")),
                        ]),
                        row(&[
                            ("column_name", Some("role")),
                            ("data_type", Some("text")),
                            ("is_nullable", Some("YES")),
                            ("column_default", Some("'user'::text")),
                        ]),
                        row(&[
                            ("column_name", Some("price")),
                            ("data_type", Some("numeric")),
                            ("numeric_precision", Some("7")),
                            ("numeric_scale", Some("3")),
                            ("is_nullable", Some("NO")),
                        ]),
                        row(&[
                            ("column_name", Some("team_id")),
                            ("data_type", Some("integer")),
                            ("is_nullable", Some("YES")),
                        ]),
                    ],
                ),
                (
                    "con.contype IN",
                    vec![
                        row(&[("kind", Some("p")), ("column_name", Some("id")), ("key_count", Some("1"))]),
                        row(&[("kind", Some("u")), ("column_name", Some("email")), ("key_count", Some("1"))]),
                        row(&[
                            ("kind", Some("f")),
                            ("column_name", Some("team_id")),
                            ("key_count", Some("1")),
                            ("foreign_table", Some("team")),
                            ("foreign_column", Some("id")),
                        ]),
                    ],
                ),
                (
                    "con.contype = 'c'",
                    vec![row(&[
                        ("column_name", Some("role")),
                        ("definition", Some("CHECK ((role = ANY (ARRAY['admin'::text, 'user'::text])))")),
                    ])],
                ),
                (
                    "pg_index",
                    vec![
                        row(&[("index_name", Some("user_pkey")), ("column_name", Some("id"))]),
                        row(&[("index_name", Some("id_email_index")), ("column_name", Some("id"))]),
                        row(&[("index_name", Some("id_email_index")), ("column_name", Some("email"))]),
                    ],
                ),
            ],
            queries: Mutex::new(Vec::new()),
        };

        let snapshot = PgIntrospector::new(gateway)
            .snapshot("user", "public")
            .await
            .unwrap()
            .unwrap();

        let id = snapshot.get_column("id").unwrap();
        assert_eq!(id.length, Some(32));
        assert!(id.is_primary());
        assert!(id.is_auto_increment());
        assert_eq!(id.default, None);

        let email = snapshot.get_column("email").unwrap();
        assert_eq!(email.length, Some(255));
        assert!(email.is_unique());
        assert!(!email.is_nullable());

        let role = snapshot.get_column("role").unwrap();
        assert_eq!(role.column_type, "enum");
        assert_eq!(role.items(), Some(&["admin".to_string(), "user".to_string()][..]));
        assert_eq!(role.default.as_deref(), Some("'user'"));

        let price = snapshot.get_column("price").unwrap();
        assert!(price.is_decimal);
        assert_eq!((price.precision, price.scale), (Some(7), Some(3)));

        let team = snapshot.get_column("team_id").unwrap();
        assert_eq!(team.foreign_keys, vec![ForeignKeyRef::new("team", "id")]);

        assert_eq!(
            snapshot.get_index("id_email_index").unwrap().columns,
            vec!["id".to_string(), "email".to_string()]
        );
        assert!(snapshot.get_index("user_pkey").is_some());
    }

    #[tokio::test]
    async fn test_query_failure_is_snapshot_unavailable() {
        struct FailingGateway;

        #[async_trait::async_trait]
        impl SqlGateway for FailingGateway {
            async fn execute(&self, _sql: &str) -> MigrateResult<u64> {
                Ok(0)
            }

            async fn query(&self, _sql: &str) -> MigrateResult<Vec<SqlRow>> {
                Err(MigrationError::database("permission denied"))
            }
        }

        let err = PgIntrospector::new(FailingGateway)
            .snapshot("user", "public")
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
