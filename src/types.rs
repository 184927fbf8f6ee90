use geo::Point;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::FinderError;

/// Ordered age-bucket labels shared by every record of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeSchema {
    /// Header labels exactly as they appear in the source.
    pub columns: Vec<String>,
    /// Shortened labels for charts and listings (`0세`, `100세 이상`).
    pub labels: Vec<String>,
}

impl AgeSchema {
    pub fn new(columns: Vec<String>) -> Self {
        let labels = columns.iter().map(|c| display_label(c)).collect();
        Self { columns, labels }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// `2025년04월_계_0세` -> `0세`
fn display_label(column: &str) -> String {
    match column.rsplit_once('_') {
        Some((_, tail)) if !tail.trim().is_empty() => tail.trim().to_string(),
        _ => column.trim().to_string(),
    }
}

/// One row of the census table.
#[derive(Debug, Clone, Serialize)]
pub struct RegionRecord {
    pub name: String,
    pub counts: Vec<u64>,
    pub total: u64,
    /// `None` when `total == 0`.
    pub proportions: Option<Vec<f64>>,
}

impl RegionRecord {
    pub fn new(name: String, counts: Vec<u64>) -> Self {
        let total: u64 = counts.iter().sum();
        let proportions = (total > 0).then(|| {
            counts.iter().map(|&c| c as f64 / total as f64).collect()
        });
        Self { name, counts, total, proportions }
    }

    pub fn is_degenerate(&self) -> bool {
        self.proportions.is_none()
    }

    /// Proportion vector, or a data error for zero-population rows.
    pub fn require_proportions(&self) -> Result<&[f64], FinderError> {
        self.proportions.as_deref().ok_or_else(|| {
            FinderError::Data(format!("'{}' has zero population; proportions are undefined", self.name))
        })
    }
}

/// Raw counts and proportions for every region, aligned to one schema.
#[derive(Debug, Clone)]
pub struct PopulationTable {
    pub schema: AgeSchema,
    records: Vec<RegionRecord>,
    by_name: HashMap<String, usize>,
}

impl PopulationTable {
    pub fn new(schema: AgeSchema, records: Vec<RegionRecord>) -> Result<Self, FinderError> {
        let mut by_name = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if record.counts.len() != schema.len() {
                return Err(FinderError::Data(format!(
                    "'{}' has {} age buckets, schema has {}",
                    record.name,
                    record.counts.len(),
                    schema.len()
                )));
            }
            if by_name.insert(record.name.clone(), i).is_some() {
                return Err(FinderError::Data(format!("duplicate region name '{}'", record.name)));
            }
        }
        Ok(Self { schema, records, by_name })
    }

    pub fn records(&self) -> &[RegionRecord] {
        &self.records
    }

    pub fn get(&self, name: &str) -> Option<&RegionRecord> {
        self.by_name.get(name).map(|&i| &self.records[i])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn usable_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_degenerate()).count()
    }
}

/// Nearest region to a query region under L1 distance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub name: String,
    pub proportions: Vec<f64>,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}
