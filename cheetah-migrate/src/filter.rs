//! Redundancy filtering of synthesized statements.

use std::collections::HashSet;

use crate::sql::{Statement, StatementKind};

/// Remove statements made unnecessary by other statements in the batch.
///
/// Dropping a column drops the indexes built on it, so an explicit
/// `drop index` for such an index would fail once the column is gone.
pub fn filter(statements: Vec<Statement>) -> Vec<Statement> {
    let dropped: HashSet<(&str, &str)> = statements
        .iter()
        .filter_map(|s| match &s.kind {
            StatementKind::DropColumn { table, column } => Some((table.as_str(), column.as_str())),
            _ => None,
        })
        .collect();

    if dropped.is_empty() {
        return statements;
    }

    let redundant: Vec<bool> = statements
        .iter()
        .map(|s| match &s.kind {
            StatementKind::DropIndex { table, columns } => columns
                .iter()
                .any(|column| dropped.contains(&(table.as_str(), column.as_str()))),
            _ => false,
        })
        .collect();

    statements
        .into_iter()
        .zip(redundant)
        .filter_map(|(statement, redundant)| (!redundant).then_some(statement))
        .collect()
}
