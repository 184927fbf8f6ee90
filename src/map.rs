use crate::config::MapConfig;
use crate::types::Coordinates;
use geo::HaversineDistance;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::Serialize;
use std::f64::consts::PI;

// Constants for Web Mercator
const TILE_SIZE: f64 = 256.0;
/// Share of the viewport the two pins may span.
const FIT_MARGIN: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PinColor {
    Blue,
    Green,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPin {
    pub name: String,
    pub coordinates: Coordinates,
    pub color: PinColor,
}

/// Two-pin map centred between the query region and its match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub center: Coordinates,
    pub zoom: u8,
    pub pins: [MapPin; 2],
    pub distance_km: f64,
}

impl MapView {
    pub fn new(config: &MapConfig, query: (&str, Coordinates), matched: (&str, Coordinates)) -> Self {
        let (a, b) = (query.1, matched.1);
        let center = Coordinates::new((a.lat + b.lat) / 2.0, (a.lon + b.lon) / 2.0);
        let zoom = fit_zoom(a, b, config.default_zoom, config.viewport_width, config.viewport_height);
        let distance_km = a.point().haversine_distance(&b.point()) / 1000.0;

        Self {
            center,
            zoom,
            pins: [
                MapPin { name: query.0.to_string(), coordinates: a, color: PinColor::Blue },
                MapPin { name: matched.0.to_string(), coordinates: b, color: PinColor::Green },
            ],
            distance_km,
        }
    }

    pub fn to_geojson(&self) -> FeatureCollection {
        let features = self
            .pins
            .iter()
            .map(|pin| {
                let mut properties = JsonObject::new();
                properties.insert("name".to_string(), pin.name.clone().into());
                properties.insert(
                    "marker-color".to_string(),
                    serde_json::to_value(pin.color).unwrap_or_default(),
                );
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::Point(vec![
                        pin.coordinates.lon,
                        pin.coordinates.lat,
                    ]))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        FeatureCollection { bbox: None, features, foreign_members: None }
    }
}

/// Global pixel position of a coordinate at `zoom`.
fn world_pixel(lat: f64, lon: f64, zoom: u8) -> (f64, f64) {
    let n = 2.0_f64.powi(zoom as i32) * TILE_SIZE;
    let x = (lon + 180.0) / 360.0 * n;
    let lat_rad = lat.to_radians();
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0 * n;
    (x, y)
}

/// Largest zoom up to `max_zoom` at which both points fit the viewport.
pub fn fit_zoom(a: Coordinates, b: Coordinates, max_zoom: u8, width: u32, height: u32) -> u8 {
    for zoom in (0..=max_zoom).rev() {
        let (ax, ay) = world_pixel(a.lat, a.lon, zoom);
        let (bx, by) = world_pixel(b.lat, b.lon, zoom);
        if (ax - bx).abs() <= width as f64 * FIT_MARGIN && (ay - by).abs() <= height as f64 * FIT_MARGIN {
            return zoom;
        }
    }
    0
}
