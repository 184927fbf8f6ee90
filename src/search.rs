use crate::error::{FinderError, Result};
use crate::types::{PopulationTable, RegionRecord};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "names", rename_all = "snake_case")]
pub enum Resolution {
    Unique(String),
    /// Several names match; the caller must pick one.
    Ambiguous(Vec<String>),
}

/// Records whose name contains `input` ignoring case, in table order.
///
/// No whitespace or diacritic normalisation is applied.
pub fn match_regions<'a>(table: &'a PopulationTable, input: &str) -> Vec<&'a RegionRecord> {
    let needle = input.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    table
        .records()
        .iter()
        .filter(|r| r.name.to_lowercase().contains(&needle))
        .collect()
}

pub fn resolve_region(table: &PopulationTable, input: &str) -> Result<Resolution> {
    let matches = match_regions(table, input);
    match matches.as_slice() {
        [] => Err(FinderError::NotFound(input.to_string())),
        [only] => Ok(Resolution::Unique(only.name.clone())),
        many => Ok(Resolution::Ambiguous(many.iter().map(|r| r.name.clone()).collect())),
    }
}

/// An exact full name is taken as is; anything else goes through [`resolve_region`].
pub fn resolve_query(table: &PopulationTable, input: &str) -> Result<Resolution> {
    match table.get(input) {
        Some(record) => Ok(Resolution::Unique(record.name.clone())),
        None => resolve_region(table, input),
    }
}

/// Strips the trailing `(code)` from a display name for geocoding.
pub fn geocoding_name(display_name: &str) -> &str {
    display_name
        .split_once('(')
        .map(|(head, _)| head)
        .unwrap_or(display_name)
        .trim_end()
}
