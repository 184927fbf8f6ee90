use crate::config::MapConfig;
use crate::error::{FinderError, GeocodeError, Result};
use crate::geocode::Geocode;
use crate::map::MapView;
use crate::search::geocoding_name;
use crate::similarity::rank_similar;
use crate::types::{PopulationTable, SimilarityResult};
use serde::Serialize;
use tracing::{info, warn};

/// Everything one comparison shows: both age profiles and, when geocoding worked, the map.
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub query: String,
    pub labels: Vec<String>,
    pub query_proportions: Vec<f64>,
    pub matched: SimilarityResult,
    pub runners_up: Vec<SimilarityResult>,
    pub map: Option<MapView>,
    pub map_error: Option<MapFailure>,
}

/// Why the map was left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapFailure {
    /// Region whose lookup failed; `None` when no lookup was attempted.
    pub region: Option<String>,
    pub message: String,
    /// Set when the configured back end needs a credential that was not supplied.
    pub missing_credential: Option<&'static str>,
}

impl MapFailure {
    pub fn new(region: Option<&str>, err: &GeocodeError) -> Self {
        let missing_credential = match err {
            GeocodeError::MissingCredentials(field) => Some(*field),
            _ => None,
        };
        Self {
            region: region.map(str::to_string),
            message: err.to_string(),
            missing_credential,
        }
    }
}

impl Comparison {
    pub fn skip_map(&mut self, err: &GeocodeError) {
        warn!(error = %err, "Map skipped");
        self.map = None;
        self.map_error = Some(MapFailure::new(None, err));
    }
}

/// Finds the nearest region (plus up to `top - 1` runners-up). No map yet.
pub fn compare_regions(table: &PopulationTable, query_name: &str, top: usize) -> Result<Comparison> {
    let query = table
        .get(query_name)
        .ok_or_else(|| FinderError::NotFound(query_name.to_string()))?;

    let mut ranked = rank_similar(table, query_name, top.max(1))?.into_iter();
    let matched = ranked
        .next()
        .ok_or(FinderError::InsufficientData { usable: table.usable_count() })?;

    info!(query = query_name, matched = %matched.name, distance = matched.distance, "Most similar region");

    Ok(Comparison {
        query: query.name.clone(),
        labels: table.schema.labels.clone(),
        query_proportions: query.require_proportions()?.to_vec(),
        matched,
        runners_up: ranked.collect(),
        map: None,
        map_error: None,
    })
}

/// Geocodes both regions one after the other. Either failure leaves the map out entirely.
pub async fn attach_map<G: Geocode>(comparison: &mut Comparison, geocoder: &G, config: &MapConfig) {
    let located = locate(geocoder, config, &comparison.query, &comparison.matched.name).await;
    match located {
        Ok(view) => {
            comparison.map = Some(view);
            comparison.map_error = None;
        }
        Err(failure) => {
            warn!(region = ?failure.region, error = %failure.message, "Map skipped");
            comparison.map = None;
            comparison.map_error = Some(failure);
        }
    }
}

async fn locate<G: Geocode>(
    geocoder: &G,
    config: &MapConfig,
    query: &str,
    matched: &str,
) -> std::result::Result<MapView, MapFailure> {
    let a = geocoder
        .resolve(geocoding_name(query))
        .await
        .map_err(|e| MapFailure::new(Some(query), &e))?;
    let b = geocoder
        .resolve(geocoding_name(matched))
        .await
        .map_err(|e| MapFailure::new(Some(matched), &e))?;

    Ok(MapView::new(config, (query, a), (matched, b)))
}
