//! Place-name to coordinate resolution.
//!
//! Four interchangeable back ends sit behind [`Geocode`]: the public
//! Nominatim service and three credential flows of the Statistics Korea
//! (SGIS) OpenAPI. Every failure comes back as a [`GeocodeError`] value.

use crate::config::{Credentials, GeocoderBackend, GeocoderConfig};
use crate::error::GeocodeError;
use crate::types::Coordinates;
use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

const SGIS_GEOCODE_PATH: &str = "addr/geocodewgs84.json";
const SGIS_AUTH_PATH: &str = "auth/authentication.json";
/// errCd the statistics API uses for an expired or revoked access token.
const SGIS_TOKEN_EXPIRED: &str = "-401";

pub type GeocodeResult = Result<Coordinates, GeocodeError>;

pub trait Geocode {
    fn resolve(&self, name: &str) -> impl Future<Output = GeocodeResult> + Send;
}

#[derive(Debug, Clone)]
pub struct PublicGeocoder {
    client: Client,
    url: String,
}

#[derive(Debug, Clone)]
pub struct StatisticsApiKeyGeocoder {
    client: Client,
    base_url: String,
    consumer_key: String,
}

#[derive(Debug, Clone)]
pub struct StatisticsApiTokenGeocoder {
    client: Client,
    base_url: String,
    access_token: String,
}

#[derive(Debug, Clone)]
pub struct StatisticsApiOAuthGeocoder {
    client: Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    tokens: Arc<TokenCache>,
}

/// Back end chosen by configuration.
#[derive(Debug, Clone)]
pub enum Geocoder {
    Public(PublicGeocoder),
    StatisticsApiKey(StatisticsApiKeyGeocoder),
    StatisticsApiToken(StatisticsApiTokenGeocoder),
    StatisticsApiOAuth(StatisticsApiOAuthGeocoder),
}

impl Geocoder {
    /// Builds the configured back end. Credentials are checked here, before any request.
    pub fn from_config(
        config: &GeocoderConfig,
        credentials: &Credentials,
        tokens: Arc<TokenCache>,
    ) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        let base_url = config.sgis_base_url.trim_end_matches('/').to_string();

        let geocoder = match config.backend {
            GeocoderBackend::Public => Geocoder::Public(PublicGeocoder {
                client,
                url: config.nominatim_url.clone(),
            }),
            GeocoderBackend::SgisKey => Geocoder::StatisticsApiKey(StatisticsApiKeyGeocoder {
                client,
                base_url,
                consumer_key: require(&credentials.consumer_key, "consumer_key")?,
            }),
            GeocoderBackend::SgisToken => Geocoder::StatisticsApiToken(StatisticsApiTokenGeocoder {
                client,
                base_url,
                access_token: require(&credentials.access_token, "access_token")?,
            }),
            GeocoderBackend::SgisOauth => Geocoder::StatisticsApiOAuth(StatisticsApiOAuthGeocoder {
                client,
                base_url,
                consumer_key: require(&credentials.consumer_key, "consumer_key")?,
                consumer_secret: require(&credentials.consumer_secret, "consumer_secret")?,
                tokens,
            }),
        };
        Ok(geocoder)
    }

    pub fn backend(&self) -> GeocoderBackend {
        match self {
            Geocoder::Public(_) => GeocoderBackend::Public,
            Geocoder::StatisticsApiKey(_) => GeocoderBackend::SgisKey,
            Geocoder::StatisticsApiToken(_) => GeocoderBackend::SgisToken,
            Geocoder::StatisticsApiOAuth(_) => GeocoderBackend::SgisOauth,
        }
    }
}

fn require(value: &Option<String>, field: &'static str) -> Result<String, GeocodeError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(GeocodeError::MissingCredentials(field))
}

impl Geocode for Geocoder {
    async fn resolve(&self, name: &str) -> GeocodeResult {
        match self {
            Geocoder::Public(g) => g.resolve(name).await,
            Geocoder::StatisticsApiKey(g) => g.resolve(name).await,
            Geocoder::StatisticsApiToken(g) => g.resolve(name).await,
            Geocoder::StatisticsApiOAuth(g) => g.resolve(name).await,
        }
    }
}

impl Geocode for PublicGeocoder {
    async fn resolve(&self, name: &str) -> GeocodeResult {
        debug!(name, "Nominatim lookup");
        let body = get_json(&self.client, &self.url, &[("q", name), ("format", "json"), ("limit", "1")]).await?;
        parse_nominatim(&body, name)
    }
}

impl Geocode for StatisticsApiKeyGeocoder {
    async fn resolve(&self, name: &str) -> GeocodeResult {
        debug!(name, "SGIS lookup (consumer key)");
        let url = format!("{}/{}", self.base_url, SGIS_GEOCODE_PATH);
        let body = get_json(&self.client, &url, &[("consumer_key", self.consumer_key.as_str()), ("address", name)]).await?;
        parse_sgis_geocode(&body, name)
    }
}

impl Geocode for StatisticsApiTokenGeocoder {
    async fn resolve(&self, name: &str) -> GeocodeResult {
        debug!(name, "SGIS lookup (access token)");
        sgis_token_geocode(&self.client, &self.base_url, &self.access_token, name).await
    }
}

impl StatisticsApiOAuthGeocoder {
    async fn issue_token(&self) -> Result<String, GeocodeError> {
        info!("Requesting SGIS access token");
        let url = format!("{}/{}", self.base_url, SGIS_AUTH_PATH);
        let body = get_json(
            &self.client,
            &url,
            &[
                ("consumer_key", self.consumer_key.as_str()),
                ("consumer_secret", self.consumer_secret.as_str()),
            ],
        )
        .await?;
        parse_sgis_token(&body)
    }
}

impl Geocode for StatisticsApiOAuthGeocoder {
    async fn resolve(&self, name: &str) -> GeocodeResult {
        let token = self.tokens.get_or_issue(&self.consumer_key, || self.issue_token()).await?;
        debug!(name, "SGIS lookup (issued token)");

        match sgis_token_geocode(&self.client, &self.base_url, &token, name).await {
            Err(GeocodeError::Api { code, .. }) if code == SGIS_TOKEN_EXPIRED => {
                // revoked before our TTL ran out; issue once more
                self.tokens.invalidate().await;
                let token = self.tokens.get_or_issue(&self.consumer_key, || self.issue_token()).await?;
                sgis_token_geocode(&self.client, &self.base_url, &token, name).await
            }
            other => other,
        }
    }
}

async fn sgis_token_geocode(client: &Client, base_url: &str, token: &str, name: &str) -> GeocodeResult {
    let url = format!("{}/{}", base_url, SGIS_GEOCODE_PATH);
    let body = get_json(client, &url, &[("accessToken", token), ("address", name)]).await?;
    parse_sgis_geocode(&body, name)
}

async fn get_json(client: &Client, url: &str, query: &[(&str, &str)]) -> Result<Value, GeocodeError> {
    let response = client.get(url).query(query).send().await?.error_for_status()?;
    Ok(response.json::<Value>().await?)
}

/// Access token issued by the OAuth-style exchange, reused until its TTL lapses.
#[derive(Debug)]
pub struct TokenCache {
    ttl: Duration,
    slot: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    consumer_key: String,
    token: String,
    issued_at: Instant,
}

impl TokenCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slot: Mutex::new(None) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached token for `consumer_key`, or a fresh one from `issue`.
    pub async fn get_or_issue<F, Fut>(&self, consumer_key: &str, issue: F) -> Result<String, GeocodeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, GeocodeError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.consumer_key == consumer_key && cached.issued_at.elapsed() < self.ttl {
                return Ok(cached.token.clone());
            }
        }

        let token = issue().await?;
        *slot = Some(CachedToken {
            consumer_key: consumer_key.to_string(),
            token: token.clone(),
            issued_at: Instant::now(),
        });
        Ok(token)
    }

    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

/// Numbers arrive either as JSON numbers or as numeric strings.
fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn err_code(v: &Value) -> Option<String> {
    match v {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

fn check_sgis_status(body: &Value) -> Result<(), GeocodeError> {
    let code = body.get("errCd").and_then(err_code).unwrap_or_default();
    if code == "0" {
        return Ok(());
    }
    let message = body
        .get("errMsg")
        .and_then(Value::as_str)
        .unwrap_or("missing errCd")
        .to_string();
    Err(GeocodeError::Api { code, message })
}

fn checked(coords: Coordinates, name: &str) -> GeocodeResult {
    if coords.is_valid() {
        Ok(coords)
    } else {
        Err(GeocodeError::BadCoordinates(format!("{} -> ({}, {})", name, coords.lat, coords.lon)))
    }
}

pub fn parse_sgis_geocode(body: &Value, name: &str) -> GeocodeResult {
    check_sgis_status(body)?;
    let result = body.get("result").ok_or_else(|| GeocodeError::NoResult(name.to_string()))?;

    // x is longitude, y is latitude; either directly on result or on the first hit
    let hit = if result.get("x").is_some() {
        Some(result)
    } else {
        result.get("resultdata").and_then(|d| d.get(0))
    };
    let hit = hit.ok_or_else(|| GeocodeError::NoResult(name.to_string()))?;

    let lon = hit.get("x").and_then(as_f64);
    let lat = hit.get("y").and_then(as_f64);
    match (lat, lon) {
        (Some(lat), Some(lon)) => checked(Coordinates::new(lat, lon), name),
        _ => Err(GeocodeError::BadCoordinates(format!("{}: x/y missing", name))),
    }
}

pub fn parse_sgis_token(body: &Value) -> Result<String, GeocodeError> {
    check_sgis_status(body)?;
    body.pointer("/result/accessToken")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GeocodeError::Api {
            code: "0".to_string(),
            message: "authentication response has no accessToken".to_string(),
        })
}

pub fn parse_nominatim(body: &Value, name: &str) -> GeocodeResult {
    let hit = body
        .as_array()
        .and_then(|hits| hits.first())
        .ok_or_else(|| GeocodeError::NoResult(name.to_string()))?;

    let lat = hit.get("lat").and_then(as_f64);
    let lon = hit.get("lon").and_then(as_f64);
    match (lat, lon) {
        (Some(lat), Some(lon)) => checked(Coordinates::new(lat, lon), name),
        _ => Err(GeocodeError::BadCoordinates(format!("{}: lat/lon missing", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_sgis_resultdata() {
        let body = json!({
            "errCd": 0,
            "errMsg": "Success",
            "result": {"totalcount": "1", "resultdata": [{"x": "126.9696", "y": "37.5759"}]}
        });
        let c = parse_sgis_geocode(&body, "사직동").unwrap();
        assert!((c.lat - 37.5759).abs() < 1e-9);
        assert!((c.lon - 126.9696).abs() < 1e-9);
    }

    #[test]
    fn test_sgis_flat_result_and_string_code() {
        let body = json!({"errCd": "0", "result": {"x": 127.0, "y": 37.5}});
        let c = parse_sgis_geocode(&body, "x").unwrap();
        assert_eq!(c, Coordinates::new(37.5, 127.0));
    }

    #[test]
    fn test_sgis_error_code() {
        let body = json!({"errCd": -401, "errMsg": "인증 정보가 존재하지 않습니다"});
        match parse_sgis_geocode(&body, "x") {
            Err(GeocodeError::Api { code, .. }) => assert_eq!(code, SGIS_TOKEN_EXPIRED),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sgis_empty_resultdata() {
        let body = json!({"errCd": 0, "result": {"resultdata": []}});
        assert!(matches!(parse_sgis_geocode(&body, "x"), Err(GeocodeError::NoResult(_))));
    }

    #[test]
    fn test_sgis_projected_coordinates_rejected() {
        // UTM-K metres instead of degrees
        let body = json!({"errCd": 0, "result": {"resultdata": [{"x": "953920.0", "y": "1952109.0"}]}});
        assert!(matches!(parse_sgis_geocode(&body, "x"), Err(GeocodeError::BadCoordinates(_))));
    }

    #[test]
    fn test_sgis_token() {
        let body = json!({"errCd": 0, "result": {"accessToken": "abc-123", "accessTimeout": "1700000000000"}});
        assert_eq!(parse_sgis_token(&body).unwrap(), "abc-123");
        let bad = json!({"errCd": -100, "errMsg": "invalid key"});
        assert!(matches!(parse_sgis_token(&bad), Err(GeocodeError::Api { .. })));
    }

    #[test]
    fn test_nominatim() {
        let body = json!([{"lat": "37.5759", "lon": "126.9696", "display_name": "사직동"}]);
        let c = parse_nominatim(&body, "사직동").unwrap();
        assert!((c.lon - 126.9696).abs() < 1e-9);
        assert!(matches!(parse_nominatim(&json!([]), "x"), Err(GeocodeError::NoResult(_))));
    }

    #[test]
    fn test_missing_credentials_checked_up_front() {
        let tokens = Arc::new(TokenCache::new(Duration::from_secs(60)));
        let mut config = GeocoderConfig::default();

        config.backend = GeocoderBackend::SgisOauth;
        let creds = Credentials {
            consumer_key: Some("key".into()),
            ..Default::default()
        };
        let err = Geocoder::from_config(&config, &creds, tokens.clone()).unwrap_err();
        assert_eq!(err, GeocodeError::MissingCredentials("consumer_secret"));

        config.backend = GeocoderBackend::SgisToken;
        let err = Geocoder::from_config(&config, &Credentials::default(), tokens.clone()).unwrap_err();
        assert_eq!(err, GeocodeError::MissingCredentials("access_token"));

        config.backend = GeocoderBackend::Public;
        let g = Geocoder::from_config(&config, &Credentials::default(), tokens).unwrap();
        assert_eq!(g.backend(), GeocoderBackend::Public);
    }

    #[tokio::test]
    async fn test_token_cache_reuses_until_ttl() {
        let cache = TokenCache::new(Duration::from_secs(3600));
        let issued = AtomicUsize::new(0);
        let issue = || async {
            let n = issued.fetch_add(1, Ordering::SeqCst);
            Ok(format!("token-{}", n))
        };

        assert_eq!(cache.get_or_issue("k", issue).await.unwrap(), "token-0");
        assert_eq!(cache.get_or_issue("k", issue).await.unwrap(), "token-0");
        // different key never sees another key's token
        assert_eq!(cache.get_or_issue("other", issue).await.unwrap(), "token-1");

        cache.invalidate().await;
        assert_eq!(cache.get_or_issue("other", issue).await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_token_cache_expires() {
        let cache = TokenCache::new(Duration::ZERO);
        let issued = AtomicUsize::new(0);
        let issue = || async {
            issued.fetch_add(1, Ordering::SeqCst);
            Ok("t".to_string())
        };
        cache.get_or_issue("k", issue).await.unwrap();
        cache.get_or_issue("k", issue).await.unwrap();
        assert_eq!(issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_issue_failure_is_not_cached() {
        let cache = TokenCache::new(Duration::from_secs(3600));
        let err = cache
            .get_or_issue("k", || async { Err(GeocodeError::Transport("down".into())) })
            .await
            .unwrap_err();
        assert_eq!(err, GeocodeError::Transport("down".into()));
        let ok = cache.get_or_issue("k", || async { Ok("fresh".to_string()) }).await.unwrap();
        assert_eq!(ok, "fresh");
    }

    mod http {
        use super::*;
        use axum::extract::{Query, State};
        use axum::http::{header::USER_AGENT, HeaderMap, StatusCode};
        use axum::response::{IntoResponse, Json, Response};
        use axum::routing::get;
        use axum::Router;
        use std::collections::HashMap;

        type Params = HashMap<String, String>;

        #[derive(Default)]
        struct Recorded {
            auth: Vec<Params>,
            geocode: Vec<Params>,
            user_agents: Vec<String>,
            /// Answer every geocode call with an expired-token error.
            always_expired: bool,
        }

        type Recorder = Arc<std::sync::Mutex<Recorded>>;

        async fn auth(State(rec): State<Recorder>, Query(q): Query<Params>) -> Json<Value> {
            let mut rec = rec.lock().unwrap();
            rec.auth.push(q);
            Json(json!({"errCd": 0, "result": {"accessToken": format!("token-{}", rec.auth.len())}}))
        }

        async fn sgis_geocode(State(rec): State<Recorder>, Query(q): Query<Params>) -> Json<Value> {
            let mut rec = rec.lock().unwrap();
            let expired = rec.always_expired || q.get("accessToken").map(String::as_str) == Some("stale");
            rec.geocode.push(q);
            if expired {
                Json(json!({"errCd": -401, "errMsg": "인증 정보가 존재하지 않습니다"}))
            } else {
                Json(json!({"errCd": 0, "result": {"resultdata": [{"x": "126.9696", "y": "37.5759"}]}}))
            }
        }

        async fn nominatim(State(rec): State<Recorder>, headers: HeaderMap, Query(q): Query<Params>) -> Json<Value> {
            let mut rec = rec.lock().unwrap();
            let agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()).unwrap_or_default();
            rec.user_agents.push(agent.to_string());
            rec.geocode.push(q);
            Json(json!([{"lat": "37.5759", "lon": "126.9696"}]))
        }

        async fn broken() -> Response {
            (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
        }

        async fn stalled() -> Json<Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!([]))
        }

        async fn serve(recorder: &Recorder) -> String {
            let app = Router::new()
                .route("/OpenAPI3/auth/authentication.json", get(auth))
                .route("/OpenAPI3/addr/geocodewgs84.json", get(sgis_geocode))
                .route("/search", get(nominatim))
                .route("/broken", get(broken))
                .route("/stalled", get(stalled))
                .with_state(recorder.clone());
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
            format!("http://{}", addr)
        }

        fn config(base: &str, backend: GeocoderBackend) -> GeocoderConfig {
            GeocoderConfig {
                backend,
                nominatim_url: format!("{}/search", base),
                sgis_base_url: format!("{}/OpenAPI3/", base),
                timeout_secs: 1,
                ..Default::default()
            }
        }

        fn credentials(key: &str, secret: &str, token: &str) -> Credentials {
            let set = |v: &str| (!v.is_empty()).then(|| v.to_string());
            Credentials {
                consumer_key: set(key),
                consumer_secret: set(secret),
                access_token: set(token),
            }
        }

        fn tokens() -> Arc<TokenCache> {
            Arc::new(TokenCache::new(Duration::from_secs(3600)))
        }

        const ADDRESS: &str = "서울특별시 종로구 사직동";

        #[tokio::test]
        async fn test_consumer_key_query() {
            let recorder = Recorder::default();
            let base = serve(&recorder).await;
            let g = Geocoder::from_config(&config(&base, GeocoderBackend::SgisKey), &credentials("key", "", ""), tokens())
                .unwrap();

            let c = g.resolve(ADDRESS).await.unwrap();
            assert_eq!(c, Coordinates::new(37.5759, 126.9696));

            let rec = recorder.lock().unwrap();
            assert_eq!(rec.geocode.len(), 1);
            assert_eq!(rec.geocode[0]["consumer_key"], "key");
            assert_eq!(rec.geocode[0]["address"], ADDRESS);
            assert!(rec.auth.is_empty());
        }

        #[tokio::test]
        async fn test_access_token_query() {
            let recorder = Recorder::default();
            let base = serve(&recorder).await;
            let g = Geocoder::from_config(&config(&base, GeocoderBackend::SgisToken), &credentials("", "", "tok"), tokens())
                .unwrap();

            g.resolve(ADDRESS).await.unwrap();

            let rec = recorder.lock().unwrap();
            assert_eq!(rec.geocode[0]["accessToken"], "tok");
            assert_eq!(rec.geocode[0]["address"], ADDRESS);
            assert!(!rec.geocode[0].contains_key("consumer_key"));
        }

        #[tokio::test]
        async fn test_oauth_exchange_then_cached_token() {
            let recorder = Recorder::default();
            let base = serve(&recorder).await;
            let g = Geocoder::from_config(
                &config(&base, GeocoderBackend::SgisOauth),
                &credentials("key", "secret", ""),
                tokens(),
            )
            .unwrap();

            g.resolve(ADDRESS).await.unwrap();
            g.resolve("서울특별시 서대문구 신촌동").await.unwrap();

            let rec = recorder.lock().unwrap();
            assert_eq!(rec.auth.len(), 1);
            assert_eq!(rec.auth[0]["consumer_key"], "key");
            assert_eq!(rec.auth[0]["consumer_secret"], "secret");
            let used: Vec<&str> = rec.geocode.iter().map(|q| q["accessToken"].as_str()).collect();
            assert_eq!(used, ["token-1", "token-1"]);
        }

        #[tokio::test]
        async fn test_expired_token_reissued_once() {
            let recorder = Recorder::default();
            let base = serve(&recorder).await;
            let cache = tokens();
            cache.get_or_issue("key", || async { Ok("stale".to_string()) }).await.unwrap();
            let g = Geocoder::from_config(
                &config(&base, GeocoderBackend::SgisOauth),
                &credentials("key", "secret", ""),
                cache,
            )
            .unwrap();

            let c = g.resolve(ADDRESS).await.unwrap();
            assert_eq!(c, Coordinates::new(37.5759, 126.9696));

            let rec = recorder.lock().unwrap();
            assert_eq!(rec.auth.len(), 1);
            let used: Vec<&str> = rec.geocode.iter().map(|q| q["accessToken"].as_str()).collect();
            assert_eq!(used, ["stale", "token-1"]);
        }

        #[tokio::test]
        async fn test_expired_token_retry_is_not_repeated() {
            let recorder = Recorder::default();
            recorder.lock().unwrap().always_expired = true;
            let base = serve(&recorder).await;
            let g = Geocoder::from_config(
                &config(&base, GeocoderBackend::SgisOauth),
                &credentials("key", "secret", ""),
                tokens(),
            )
            .unwrap();

            let err = g.resolve(ADDRESS).await.unwrap_err();
            assert!(matches!(err, GeocodeError::Api { ref code, .. } if code == SGIS_TOKEN_EXPIRED));

            let rec = recorder.lock().unwrap();
            assert_eq!(rec.auth.len(), 2);
            assert_eq!(rec.geocode.len(), 2);
        }

        #[tokio::test]
        async fn test_nominatim_query_and_user_agent() {
            let recorder = Recorder::default();
            let base = serve(&recorder).await;
            let g = Geocoder::from_config(&config(&base, GeocoderBackend::Public), &Credentials::default(), tokens())
                .unwrap();

            let c = g.resolve(ADDRESS).await.unwrap();
            assert_eq!(c, Coordinates::new(37.5759, 126.9696));

            let rec = recorder.lock().unwrap();
            assert_eq!(rec.geocode[0]["q"], ADDRESS);
            assert_eq!(rec.geocode[0]["format"], "json");
            assert_eq!(rec.geocode[0]["limit"], "1");
            assert!(rec.user_agents[0].starts_with("dongmatch/"));
        }

        #[tokio::test]
        async fn test_http_error_status_is_transport_error() {
            let recorder = Recorder::default();
            let base = serve(&recorder).await;
            let mut cfg = config(&base, GeocoderBackend::Public);
            cfg.nominatim_url = format!("{}/broken", base);
            let g = Geocoder::from_config(&cfg, &Credentials::default(), tokens()).unwrap();

            assert!(matches!(g.resolve(ADDRESS).await, Err(GeocodeError::Transport(_))));
        }

        #[tokio::test]
        async fn test_timeout_is_transport_error() {
            let recorder = Recorder::default();
            let base = serve(&recorder).await;
            let mut cfg = config(&base, GeocoderBackend::Public);
            cfg.nominatim_url = format!("{}/stalled", base);
            let g = Geocoder::from_config(&cfg, &Credentials::default(), tokens()).unwrap();

            assert!(matches!(g.resolve(ADDRESS).await, Err(GeocodeError::Transport(_))));
        }
    }
}
