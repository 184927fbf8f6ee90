//! Nearest-neighbour search over age proportion vectors.
//!
//! Distances are computed into a fresh array per query; the table itself is
//! never written to, so one loaded table can serve any number of queries.

use crate::error::{FinderError, Result};
use crate::types::{PopulationTable, SimilarityResult};
use rayon::prelude::*;

/// Sum of absolute component differences.
pub fn l1_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

/// Distance from `query` to every row, in table order. `None` for zero-population rows.
pub fn distances(table: &PopulationTable, query: &[f64]) -> Vec<Option<f64>> {
    table
        .records()
        .par_iter()
        .map(|r| r.proportions.as_deref().map(|p| l1_distance(p, query)))
        .collect()
}

/// The `k` regions closest to `query_name`, nearest first.
///
/// Ties keep table order. The query region and zero-population regions are
/// never candidates.
pub fn rank_similar(table: &PopulationTable, query_name: &str, k: usize) -> Result<Vec<SimilarityResult>> {
    let query_pos = table
        .position(query_name)
        .ok_or_else(|| FinderError::NotFound(query_name.to_string()))?;

    let usable = table.usable_count();
    if usable < 2 {
        return Err(FinderError::InsufficientData { usable });
    }

    let query = table.records()[query_pos].require_proportions()?;

    let mut ranked: Vec<(usize, f64)> = distances(table, query)
        .into_iter()
        .enumerate()
        .filter(|(i, _)| *i != query_pos)
        .filter_map(|(i, d)| d.map(|d| (i, d)))
        .collect();

    // stable: equal distances stay in table order
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    Ok(ranked
        .into_iter()
        .take(k)
        .map(|(i, distance)| {
            let record = &table.records()[i];
            SimilarityResult {
                name: record.name.clone(),
                proportions: record.proportions.clone().unwrap_or_default(),
                distance,
            }
        })
        .collect())
}

pub fn find_most_similar(table: &PopulationTable, query_name: &str) -> Result<SimilarityResult> {
    rank_similar(table, query_name, 1)?
        .into_iter()
        .next()
        .ok_or(FinderError::InsufficientData { usable: table.usable_count() })
}
