use crate::compare::{attach_map, compare_regions, Comparison};
use crate::config::{AppConfig, Credentials, GeocoderBackend};
use crate::data::TableCache;
use crate::error::FinderError;
use crate::geocode::{Geocoder, TokenCache};
use crate::render::{encode_png, render_comparison};
use crate::search::{resolve_query, resolve_region, Resolution};
use crate::types::PopulationTable;
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

pub struct AppState {
    pub config: AppConfig,
    pub tables: Arc<TableCache>,
    pub tokens: Arc<TokenCache>,
}

impl AppState {
    fn table(&self) -> Result<Arc<PopulationTable>, ApiError> {
        Ok(self.tables.get_or_load(&self.config.input)?)
    }
}

#[derive(Deserialize)]
pub struct RegionParams {
    q: String,
}

#[derive(Serialize)]
pub struct RegionResponse {
    resolution: Resolution,
    total_regions: usize,
}

/// POST body of `/api/compare`. Credentials travel here, never in the URL.
#[derive(Deserialize)]
pub struct CompareRequest {
    name: String,
    #[serde(default)]
    top: Option<usize>,
    #[serde(default)]
    consumer_key: Option<String>,
    #[serde(default)]
    consumer_secret: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Which credential fields the page has to ask for.
#[derive(Debug, Serialize)]
pub struct GeocoderInfo {
    backend: GeocoderBackend,
    credentials: Vec<&'static str>,
}

#[derive(Deserialize)]
pub struct ChartParams {
    name: String,
    other: String,
}

/// JSON error banner with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    candidates: Vec<String>,
}

impl From<FinderError> for ApiError {
    fn from(e: FinderError) -> Self {
        let status = match &e {
            FinderError::NotFound(_) => StatusCode::NOT_FOUND,
            FinderError::Ambiguous(_) => StatusCode::CONFLICT,
            FinderError::Data(_) | FinderError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            FinderError::Geocode(_) => StatusCode::BAD_GATEWAY,
            FinderError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let candidates = match &e {
            FinderError::Ambiguous(names) => names.clone(),
            _ => Vec::new(),
        };
        Self { status, message: e.to_string(), candidates }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{:#}", e),
            candidates: Vec::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "{}", self.message);
        }
        let body = Json(json!({ "error": self.message, "candidates": self.candidates }));
        (self.status, body).into_response()
    }
}

pub async fn start_server(config: AppConfig, tables: Arc<TableCache>) -> Result<()> {
    // Warm the cache so the first request does not pay for decoding
    let table = tables
        .get_or_load(&config.input)
        .context("Failed to load population table")?;
    info!("Serving {} regions", table.len());

    let state = Arc::new(AppState {
        tokens: Arc::new(TokenCache::new(std::time::Duration::from_secs(config.geocoder.token_ttl_secs))),
        tables,
        config: config.clone(),
    });

    let port = config.server.port;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    info!("Starting server on http://{}", addr);

    let app = router(state, &config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: Arc<AppState>, config: &AppConfig) -> Router {
    Router::new()
        .route("/api/regions", get(regions_handler))
        .route("/api/geocoder", get(geocoder_handler))
        .route("/api/compare", post(compare_handler))
        .route("/api/chart.png", get(chart_handler))
        .fallback_service(ServeDir::new(&config.server.web_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn regions_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RegionParams>,
) -> Result<Json<RegionResponse>, ApiError> {
    let table = state.table()?;
    let resolution = resolve_region(&table, &params.q)?;
    Ok(Json(RegionResponse {
        resolution,
        total_regions: table.len(),
    }))
}

async fn geocoder_handler(State(state): State<Arc<AppState>>) -> Json<GeocoderInfo> {
    let geocoder = &state.config.geocoder;
    Json(GeocoderInfo {
        backend: geocoder.backend,
        credentials: geocoder.credentials.missing_for(geocoder.backend),
    })
}

async fn compare_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<Comparison>, ApiError> {
    let table = state.table()?;

    // Exact names come from the selection list; otherwise the input must resolve uniquely.
    let name = match resolve_query(&table, &request.name)? {
        Resolution::Unique(name) => name,
        Resolution::Ambiguous(names) => return Err(FinderError::Ambiguous(names).into()),
    };

    let mut comparison = compare_regions(&table, &name, request.top.unwrap_or(1))?;

    let supplied = Credentials {
        consumer_key: request.consumer_key,
        consumer_secret: request.consumer_secret,
        access_token: request.access_token,
    };
    let credentials = state.config.geocoder.credentials.merged(&supplied);

    match Geocoder::from_config(&state.config.geocoder, &credentials, state.tokens.clone()) {
        Ok(geocoder) => attach_map(&mut comparison, &geocoder, &state.config.map).await,
        Err(e) => comparison.skip_map(&e),
    }

    Ok(Json(comparison))
}

async fn chart_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChartParams>,
) -> Result<Response, ApiError> {
    let table = state.table()?;
    let lookup = |name: &str| -> Result<Vec<f64>, ApiError> {
        let record = table
            .get(name)
            .ok_or_else(|| FinderError::NotFound(name.to_string()))?;
        Ok(record.require_proportions()?.to_vec())
    };
    let query = lookup(&params.name)?;
    let other = lookup(&params.other)?;

    let img = render_comparison(&state.config.chart, &query, &other)?;
    let png = encode_png(&img)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}
