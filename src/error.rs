use thiserror::Error;

pub type Result<T> = std::result::Result<T, FinderError>;

#[derive(Error, Debug)]
pub enum FinderError {
    #[error("Data error: {0}")]
    Data(String),

    #[error("Region not found: {0}")]
    NotFound(String),

    #[error("Ambiguous region name, {} candidates match", .0.len())]
    Ambiguous(Vec<String>),

    #[error("Insufficient data: {usable} usable region(s), need at least 2")]
    InsufficientData { usable: usize },

    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for FinderError {
    fn from(e: csv::Error) -> Self {
        FinderError::Data(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeocodeError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(&'static str),

    #[error("Geocoder request failed: {0}")]
    Transport(String),

    #[error("Geocoder returned error {code}: {message}")]
    Api { code: String, message: String },

    #[error("No location found for '{0}'")]
    NoResult(String),

    #[error("Geocoder returned unusable coordinates: {0}")]
    BadCoordinates(String),
}

impl From<reqwest::Error> for GeocodeError {
    fn from(e: reqwest::Error) -> Self {
        GeocodeError::Transport(e.to_string())
    }
}
