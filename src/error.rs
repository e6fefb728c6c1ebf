use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("TrueNAS API error: {0}")]
    TrueNasApi(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Collector name '{0}' is reserved for scrape lifecycle metrics")]
    ReservedName(String),

    #[error("Unknown collector: {0}")]
    UnknownCollector(String),

    #[error("No session client registered")]
    NoSessionClient,

    #[error("Could not create collector '{name}': {source}")]
    Factory {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Login to target '{target}' failed: {source}")]
    Login {
        target: String,
        #[source]
        source: Box<ExporterError>,
    },

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, ExporterError>;
