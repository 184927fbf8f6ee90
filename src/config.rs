use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub data_csv: PathBuf,
    /// WHATWG label of the source code page. CP949 is `windows-949`.
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default = "default_name_column")]
    pub name_column: String,
    /// Columns whose header contains this marker are age buckets.
    #[serde(default = "default_age_marker")]
    pub age_marker: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GeocoderBackend {
    /// OpenStreetMap Nominatim, no credentials
    Public,
    /// Statistics API with a pre-issued access token
    SgisToken,
    /// Statistics API with a static consumer key
    SgisKey,
    /// Statistics API, consumer key + secret exchanged for a short-lived token
    SgisOauth,
}

impl GeocoderBackend {
    /// Credential fields this back end cannot work without.
    pub fn required_credentials(self) -> &'static [&'static str] {
        match self {
            GeocoderBackend::Public => &[],
            GeocoderBackend::SgisToken => &["access_token"],
            GeocoderBackend::SgisKey => &["consumer_key"],
            GeocoderBackend::SgisOauth => &["consumer_key", "consumer_secret"],
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub access_token: Option<String>,
}

impl Credentials {
    /// Fields set in `other` win; blank strings count as unset.
    pub fn merged(&self, other: &Credentials) -> Credentials {
        fn pick(a: &Option<String>, b: &Option<String>) -> Option<String> {
            let set = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();
            set(b).or_else(|| set(a))
        }
        Credentials {
            consumer_key: pick(&self.consumer_key, &other.consumer_key),
            consumer_secret: pick(&self.consumer_secret, &other.consumer_secret),
            access_token: pick(&self.access_token, &other.access_token),
        }
    }

    /// Value of a credential field by name; blank counts as unset.
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "consumer_key" => &self.consumer_key,
            "consumer_secret" => &self.consumer_secret,
            "access_token" => &self.access_token,
            _ => return None,
        };
        value.as_deref().filter(|v| !v.trim().is_empty())
    }

    /// Fields `backend` needs that are not set here.
    pub fn missing_for(&self, backend: GeocoderBackend) -> Vec<&'static str> {
        backend
            .required_credentials()
            .iter()
            .copied()
            .filter(|f| self.field(f).is_none())
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeocoderConfig {
    #[serde(default = "default_backend")]
    pub backend: GeocoderBackend,
    #[serde(default = "default_nominatim_url")]
    pub nominatim_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_sgis_url")]
    pub sgis_base_url: String,
    #[serde(flatten)]
    pub credentials: Credentials,
    /// Lifetime of a token issued by the OAuth-style exchange.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            nominatim_url: default_nominatim_url(),
            user_agent: default_user_agent(),
            sgis_base_url: default_sgis_url(),
            credentials: Credentials::default(),
            token_ttl_secs: default_token_ttl(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChartConfig {
    pub width: u32,
    pub height: u32,
    pub query_color: String, // Hex code
    pub match_color: String,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 400,
            query_color: "#1f77b4".to_string(),
            match_color: "#2ca02c".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub default_zoom: u8,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_zoom: 12,
            viewport_width: 700,
            viewport_height: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub web_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            web_dir: PathBuf::from("web"),
        }
    }
}

fn default_encoding() -> String {
    "windows-949".to_string()
}

fn default_name_column() -> String {
    "행정구역".to_string()
}

fn default_age_marker() -> String {
    "세".to_string()
}

fn default_backend() -> GeocoderBackend {
    GeocoderBackend::Public
}

fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org/search".to_string()
}

fn default_user_agent() -> String {
    concat!("dongmatch/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_sgis_url() -> String {
    "https://sgisapi.kostat.go.kr/OpenAPI3".to_string()
}

fn default_token_ttl() -> u64 {
    4 * 60 * 60
}

fn default_timeout() -> u64 {
    10
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse TOML configuration")
    }
}
