//! Identity substitution over tabular datasets.
//!
//! A mapping is compiled once into an [`IdentityMatcher`] and then reused
//! for every cell. String cells are rewritten; arrays are walked
//! element-wise and objects value-wise, recursively; numbers, booleans and
//! nulls pass through untouched.

pub mod matcher;

pub use matcher::IdentityMatcher;

use std::borrow::Cow;

use serde_json::Value;
use tracing::{debug, warn};

use crate::dataset::TabularDataset;
use crate::errors::MappingValidationError;
use crate::identity::IdentityMapping;

/// What a substitution pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionStats {
    /// Cells whose content changed.
    pub cells_changed: usize,
    /// Requested columns absent from the dataset.
    pub missing_columns: Vec<String>,
}

/// Rewrite every string inside `value`. Returns whether anything changed.
pub fn anonymize_value(value: &mut Value, matcher: &IdentityMatcher) -> bool {
    match value {
        Value::String(text) => match matcher.replace(text) {
            Cow::Owned(replaced) => {
                *text = replaced;
                true
            }
            Cow::Borrowed(_) => false,
        },
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, item| anonymize_value(item, matcher) | changed),
        Value::Object(map) => map
            .values_mut()
            .fold(false, |changed, item| anonymize_value(item, matcher) | changed),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Anonymize every column of `dataset` with `mapping`, returning the new
/// dataset.
pub fn anonymize(
    mut dataset: TabularDataset,
    mapping: &IdentityMapping,
) -> Result<TabularDataset, MappingValidationError> {
    let matcher = IdentityMatcher::compile(mapping)?;
    let columns = dataset.columns().to_vec();
    anonymize_columns(&mut dataset, &matcher, &columns);
    Ok(dataset)
}

/// Anonymize only `columns` of `dataset` in place. Columns the dataset does
/// not have are skipped and reported.
pub fn anonymize_columns(
    dataset: &mut TabularDataset,
    matcher: &IdentityMatcher,
    columns: &[String],
) -> SubstitutionStats {
    let mut stats = SubstitutionStats::default();
    let mut indices = Vec::with_capacity(columns.len());
    for column in columns {
        match dataset.column_index(column) {
            Some(idx) => indices.push(idx),
            None => {
                warn!(column = %column, "allowlisted column not present, skipping");
                stats.missing_columns.push(column.clone());
            }
        }
    }

    if matcher.is_empty() {
        return stats;
    }

    for row in dataset.rows_mut() {
        for &idx in &indices {
            if anonymize_value(&mut row[idx], matcher) {
                stats.cells_changed += 1;
            }
        }
    }
    debug!(cells = stats.cells_changed, "substitution pass complete");
    stats
}

/// Whether any string inside `value` contains a key of `matcher`.
pub fn value_matches(value: &Value, matcher: &IdentityMatcher) -> bool {
    match value {
        Value::String(text) => matcher.is_match(text),
        Value::Array(items) => items.iter().any(|item| value_matches(item, matcher)),
        Value::Object(map) => map.values().any(|item| value_matches(item, matcher)),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Keep only rows where at least one of `columns` matches `matcher`.
/// Returns the number of rows removed.
pub fn retain_matching_rows(
    dataset: &mut TabularDataset,
    matcher: &IdentityMatcher,
    columns: &[String],
) -> usize {
    let indices: Vec<usize> = columns
        .iter()
        .filter_map(|c| dataset.column_index(c))
        .collect();
    let before = dataset.len();
    dataset.retain_rows(|row| indices.iter().any(|&idx| value_matches(&row[idx], matcher)));
    before - dataset.len()
}
