use crate::config::InputConfig;
use crate::error::{FinderError, Result};
use crate::types::{AgeSchema, PopulationTable, RegionRecord};
use csv::ReaderBuilder;
use encoding_rs::Encoding;
use std::fs;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub fn load_data(input: &InputConfig) -> Result<PopulationTable> {
    info!("Loading population table from {:?}", input.data_csv);

    let bytes = fs::read(&input.data_csv)?;
    let text = decode_source(&bytes, &input.encoding)?;
    let table = parse_table(&text, &input.name_column, &input.age_marker)?;

    info!(
        regions = table.len(),
        usable = table.usable_count(),
        buckets = table.schema.len(),
        "Loaded population table"
    );
    Ok(table)
}

/// Decode the raw file with an explicit legacy code page. Never falls back to UTF-8.
pub fn decode_source(bytes: &[u8], label: &str) -> Result<String> {
    let encoding = Encoding::for_label(label.as_bytes())
        .ok_or_else(|| FinderError::Data(format!("Unknown encoding label '{}'", label)))?;

    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| FinderError::Data(format!("Input is not valid {}", encoding.name())))
}

pub fn parse_table(text: &str, name_column: &str, age_marker: &str) -> Result<PopulationTable> {
    let mut rdr = ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());
    let headers = rdr.headers()?.clone();

    let name_idx = headers
        .iter()
        .position(|h| h == name_column)
        .ok_or_else(|| FinderError::Data(format!("Name column '{}' not found", name_column)))?;

    // Bucket columns in header order; their positions define the schema.
    let bucket_idx: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| *i != name_idx && h.contains(age_marker))
        .map(|(i, _)| i)
        .collect();

    if bucket_idx.is_empty() {
        return Err(FinderError::Data(format!(
            "No age-bucket columns (marker '{}') in header",
            age_marker
        )));
    }

    let schema = AgeSchema::new(bucket_idx.iter().map(|&i| headers[i].to_string()).collect());
    debug!(columns = ?schema.labels, "Age bucket schema");

    let mut records = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let name = record.get(name_idx).unwrap_or("").trim();

        if name.is_empty() {
            continue;
        }

        let counts = bucket_idx
            .iter()
            .map(|&i| parse_count(record.get(i).unwrap_or(""), row + 2, &headers[i]))
            .collect::<Result<Vec<u64>>>()?;

        records.push(RegionRecord::new(name.to_string(), counts));
    }

    PopulationTable::new(schema, records)
}

/// `" 1,234 "` -> 1234. `line` is the 1-based line in the source.
fn parse_count(raw: &str, line: usize, column: &str) -> Result<u64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    cleaned.parse::<u64>().map_err(|_| {
        FinderError::Data(format!("Line {}: '{}' in column '{}' is not a count", line, raw, column))
    })
}

/// Process-lifetime memo for the loaded table. No expiry; `invalidate` forces a reload.
#[derive(Debug, Default)]
pub struct TableCache {
    table: Mutex<Option<Arc<PopulationTable>>>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&self, input: &InputConfig) -> Result<Arc<PopulationTable>> {
        self.get_or_try_init(|| load_data(input))
    }

    pub fn get_or_try_init<F>(&self, load: F) -> Result<Arc<PopulationTable>>
    where
        F: FnOnce() -> Result<PopulationTable>,
    {
        let mut slot = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(table) = slot.as_ref() {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(load()?);
        *slot = Some(Arc::clone(&table));
        Ok(table)
    }

    pub fn invalidate(&self) {
        *self.table.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
