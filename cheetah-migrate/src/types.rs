//! Type canonicalization.
//!
//! Entity-level type tokens (`Number`, `String`, `Date`, ...) and database
//! reported type names are mapped onto a small canonical vocabulary before
//! diffing. The synthesizer renders canonical types back to dialect DDL.

use serde::{Deserialize, Serialize};

/// SQL dialect targeted by the diff engine and the synthesizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL.
    #[default]
    Postgres,
    /// No dialect-specific length rules.
    Generic,
}

impl Dialect {
    /// Check if this is the PostgreSQL dialect.
    pub fn is_postgres(&self) -> bool {
        matches!(self, Self::Postgres)
    }
}

/// Canonical type name for 32-bit integers.
pub const INTEGER: &str = "integer";
/// Canonical type name for 64-bit integers.
pub const BIGINT: &str = "bigint";
/// Canonical type name for fixed-point numbers.
pub const DECIMAL: &str = "decimal";
/// Canonical type name for bounded strings.
pub const VARCHAR: &str = "character varying";
/// Canonical type name for booleans.
pub const BOOLEAN: &str = "boolean";
/// Canonical type name for timestamps.
pub const TIMESTAMP: &str = "timestamp";
/// Canonical type name for JSON documents.
pub const JSON: &str = "json";
/// Canonical type name for UUIDs.
pub const UUID: &str = "uuid";
/// Canonical type name for unbounded text.
pub const TEXT: &str = "text";
/// Canonical type name for enumerations.
pub const ENUM: &str = "enum";

/// Generic type name databases report for native enum types.
pub const USER_DEFINED: &str = "USER-DEFINED";

/// Length PostgreSQL reports for `integer` columns.
pub const POSTGRES_INTEGER_LENGTH: u32 = 32;

/// A canonical SQL type with its default length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalType {
    /// Canonical type name.
    pub name: &'static str,
    /// Default length, if the type has one.
    pub length: Option<u32>,
}

impl CanonicalType {
    const fn new(name: &'static str, length: Option<u32>) -> Self {
        Self { name, length }
    }

    /// Check if this is the decimal type.
    pub fn is_decimal(&self) -> bool {
        self.name == DECIMAL
    }
}

/// Map a type token onto its canonical type.
///
/// Unknown tokens fall back to `character varying(255)`. Canonical names are
/// accepted as tokens too, so canonicalizing a canonical name is a no-op.
pub fn canonicalize(token: &str) -> CanonicalType {
    match token {
        "Number" | "int" | "integer" | "int4" => CanonicalType::new(INTEGER, Some(32)),
        "bigint" | "int8" => CanonicalType::new(BIGINT, None),
        "float" | "double" | "decimal" | "numeric" => CanonicalType::new(DECIMAL, None),
        "String" | "varchar" | "character varying" => CanonicalType::new(VARCHAR, Some(255)),
        "Boolean" | "boolean" | "bool" => CanonicalType::new(BOOLEAN, None),
        "Date" | "timestamp" => CanonicalType::new(TIMESTAMP, None),
        "Object" | "json" => CanonicalType::new(JSON, None),
        "uuid" => CanonicalType::new(UUID, None),
        "text" => CanonicalType::new(TEXT, None),
        "enum" => CanonicalType::new(ENUM, None),
        _ => CanonicalType::new(VARCHAR, Some(255)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_tokens() {
        assert_eq!(canonicalize("Number"), CanonicalType::new(INTEGER, Some(32)));
        assert_eq!(canonicalize("String"), CanonicalType::new(VARCHAR, Some(255)));
        assert_eq!(canonicalize("Date").name, TIMESTAMP);
        assert_eq!(canonicalize("Object").name, JSON);
        assert_eq!(canonicalize("Boolean").name, BOOLEAN);
        assert_eq!(canonicalize("float").name, DECIMAL);
        assert_eq!(canonicalize("bigint").length, None);
    }

    #[test]
    fn test_unknown_token_falls_back_to_varchar() {
        assert_eq!(canonicalize("Email"), CanonicalType::new(VARCHAR, Some(255)));
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        for token in [
            "Number", "int", "bigint", "float", "double", "decimal", "String", "varchar",
            "Boolean", "Date", "Object", "uuid", "text", "enum", "whatever",
        ] {
            let once = canonicalize(token);
            assert_eq!(canonicalize(once.name), once, "token {token}");
        }
    }

    #[test]
    fn test_dialect_default() {
        assert!(Dialect::default().is_postgres());
        assert!(!Dialect::Generic.is_postgres());
    }
}
