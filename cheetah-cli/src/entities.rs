//! Entity descriptors read from TOML files.
//!
//! ```toml
//! [[table]]
//! name = "user"
//!
//! [[table.column]]
//! name = "id"
//! type = "Number"
//! primary = true
//! auto_increment = true
//!
//! [[table.column]]
//! name = "email"
//! type = "String"
//! unique = true
//! index = true
//!
//! [[table.index]]
//! columns = ["id", "email"]
//! ```

use std::path::{Path, PathBuf};

use cheetah_migrate::types::canonicalize;
use cheetah_migrate::{
    ColumnInfo, EntityModelProvider, ForeignKeyRef, IndexInfo, MigrateResult, MigrationError,
    TableSnapshot,
};
use serde::Deserialize;
use tracing::debug;

/// Extension of descriptor files.
pub const DESCRIPTOR_EXTENSION: &str = "toml";

#[derive(Debug, Default, Deserialize)]
struct DescriptorFile {
    #[serde(default, rename = "table")]
    tables: Vec<TableDescriptor>,
}

#[derive(Debug, Deserialize)]
struct TableDescriptor {
    name: String,
    schema: Option<String>,
    #[serde(default, rename = "column")]
    columns: Vec<ColumnDescriptor>,
    #[serde(default, rename = "index")]
    indexes: Vec<IndexDescriptor>,
}

#[derive(Debug, Deserialize)]
struct ColumnDescriptor {
    name: String,
    #[serde(rename = "type", default = "default_type")]
    column_type: String,
    length: Option<u32>,
    precision: Option<u32>,
    scale: Option<u32>,
    nullable: Option<bool>,
    primary: Option<bool>,
    unique: Option<bool>,
    auto_increment: Option<bool>,
    default: Option<String>,
    #[serde(rename = "enum")]
    enum_items: Option<Vec<String>>,
    references: Option<String>,
    #[serde(default)]
    index: bool,
}

#[derive(Debug, Deserialize)]
struct IndexDescriptor {
    name: Option<String>,
    columns: Vec<String>,
}

fn default_type() -> String {
    "String".to_string()
}

/// Yields tables declared in TOML descriptor files.
#[derive(Debug, Clone)]
pub struct TomlEntityProvider {
    path: PathBuf,
    default_schema: String,
}

impl TomlEntityProvider {
    /// Create a provider over a descriptor file or directory.
    pub fn new(path: impl Into<PathBuf>, default_schema: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_schema: default_schema.into(),
        }
    }

    fn descriptor_files(&self) -> MigrateResult<Vec<PathBuf>> {
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }
        if !self.path.is_dir() {
            return Err(MigrationError::configuration_missing(format!(
                "Entities path not found: {}",
                self.path.display()
            )));
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(DESCRIPTOR_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn load(&self, path: &Path) -> MigrateResult<Vec<TableSnapshot>> {
        let content = std::fs::read_to_string(path)?;
        let file: DescriptorFile = toml::from_str(&content)
            .map_err(|e| MigrationError::other(format!("Failed to parse {}: {}", path.display(), e)))?;

        debug!(file = %path.display(), tables = file.tables.len(), "Loaded entity descriptors");
        file.tables
            .into_iter()
            .map(|table| self.to_snapshot(table))
            .collect()
    }

    fn to_snapshot(&self, table: TableDescriptor) -> MigrateResult<TableSnapshot> {
        let name = to_snake_case(&table.name);
        let mut snapshot =
            TableSnapshot::new(&name).schema(table.schema.unwrap_or_else(|| self.default_schema.clone()));
        let mut primary = Vec::new();

        for column in table.columns {
            let column_name = to_snake_case(&column.name);
            if column.index {
                snapshot.indexes.push(IndexInfo::new(
                    format!("{column_name}_index"),
                    [column_name.clone()],
                ));
            }
            if column.primary == Some(true) {
                primary.push(column_name.clone());
            }
            snapshot.columns.push(to_column(column_name, column)?);
        }

        for index in table.indexes {
            let columns: Vec<String> = index.columns.iter().map(|c| to_snake_case(c)).collect();
            let name = index.name.unwrap_or_else(|| format!("{}_index", columns.join("_")));
            snapshot.indexes.push(IndexInfo::new(name, columns));
        }

        if !primary.is_empty() {
            snapshot.indexes.push(IndexInfo::new(format!("{name}_pkey"), primary));
        }

        Ok(snapshot)
    }
}

impl EntityModelProvider for TomlEntityProvider {
    fn tables(&self) -> MigrateResult<Vec<TableSnapshot>> {
        let mut tables = Vec::new();
        for file in self.descriptor_files()? {
            tables.extend(self.load(&file)?);
        }

        if tables.is_empty() {
            return Err(MigrationError::entity_discovery_empty(format!(
                "no tables declared under {}",
                self.path.display()
            )));
        }
        Ok(tables)
    }
}

fn to_column(name: String, column: ColumnDescriptor) -> MigrateResult<ColumnInfo> {
    let mut info = ColumnInfo::new(&name, column.column_type.as_str());
    info.is_decimal = canonicalize(&column.column_type).is_decimal();
    info.length = column.length;
    info.precision = column.precision;
    info.scale = column.scale;
    info.nullable = column.nullable;
    info.primary = column.primary;
    info.unique = column.unique;
    info.auto_increment = column.auto_increment;
    info.default = column.default;
    info.enum_items = column.enum_items;

    if let Some(target) = column.references {
        let (table, referenced) = target.split_once('.').unwrap_or((target.as_str(), "id"));
        if table.is_empty() || referenced.is_empty() {
            return Err(MigrationError::other(format!(
                "Invalid reference '{target}' on column '{name}'"
            )));
        }
        info.foreign_keys
            .push(ForeignKeyRef::new(to_snake_case(table), to_snake_case(referenced)));
    }

    Ok(info)
}

/// Convert `camelCase` and `PascalCase` names to `snake_case`.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("createdAt"), "created_at");
        assert_eq!(to_snake_case("UserProfile"), "user_profile");
        assert_eq!(to_snake_case("user_id"), "user_id");
        assert_eq!(to_snake_case("address2Line"), "address2_line");
    }

    #[test]
    fn test_load_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "user.toml",
            r#"
            [[table]]
            name = "user"

            [[table.column]]
            name = "id"
            type = "Number"
            primary = true
            auto_increment = true

            [[table.column]]
            name = "email"
            type = "String"
            unique = true
            index = true

            [[table.column]]
            name = "teamId"
            type = "Number"
            references = "team.id"

            [[table.column]]
            name = "price"
            type = "float"
            precision = 7
            scale = 3

            [[table.column]]
            name = "role"
            type = "enum"
            enum = ["admin", "user"]

            [[table.index]]
            columns = ["id", "email"]
            "#,
        );

        let tables = TomlEntityProvider::new(dir.path(), "public").tables().unwrap();
        assert_eq!(tables.len(), 1);

        let user = &tables[0];
        assert_eq!(user.schema, "public");
        assert_eq!(
            user.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["id", "email", "team_id", "price", "role"]
        );
        assert_eq!(
            user.get_column("team_id").unwrap().foreign_keys,
            vec![ForeignKeyRef::new("team", "id")]
        );
        assert!(user.get_column("price").unwrap().is_decimal);
        assert_eq!(
            user.get_column("role").unwrap().items(),
            Some(&["admin".to_string(), "user".to_string()][..])
        );

        let indexes: Vec<&str> = user.indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(indexes, vec!["email_index", "id_email_index", "user_pkey"]);
        assert_eq!(user.get_index("user_pkey").unwrap().columns, vec!["id".to_string()]);
    }

    #[test]
    fn test_explicit_schema_and_single_file() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "entities.toml",
            "[[table]]\nname = \"Audit\"\nschema = \"logs\"\n\n[[table.column]]\nname = \"at\"\ntype = \"Date\"\n",
        );

        let tables = TomlEntityProvider::new(dir.path().join("entities.toml"), "public")
            .tables()
            .unwrap();
        assert_eq!(tables[0].name, "audit");
        assert_eq!(tables[0].schema, "logs");
        assert!(tables[0].indexes.is_empty());
    }

    #[test]
    fn test_missing_path() {
        let err = TomlEntityProvider::new("/nonexistent/entities", "public")
            .tables()
            .unwrap_err();
        assert!(matches!(err, MigrationError::ConfigurationMissing(_)));
    }

    #[test]
    fn test_no_tables() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.txt", "not a descriptor");

        let err = TomlEntityProvider::new(dir.path(), "public").tables().unwrap_err();
        assert!(err.is_recoverable());
    }
}
