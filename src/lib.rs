//! Finds the Korean neighbourhood whose population-by-age profile is closest
//! to a chosen one, and shows the pair as a bar chart and a two-pin map.

pub mod compare;
pub mod config;
pub mod data;
pub mod error;
pub mod geocode;
pub mod map;
pub mod render;
pub mod search;
pub mod server;
pub mod similarity;
pub mod types;

pub use error::{FinderError, GeocodeError, Result};
pub use types::{AgeSchema, Coordinates, PopulationTable, RegionRecord, SimilarityResult};
