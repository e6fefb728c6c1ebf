use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;

use crate::metrics::is_valid_namespace;
use crate::scrape::is_reserved_name;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub exporter: ExporterConfig,
    pub truenas: TrueNasConfig,
    /// Collectors explicitly enabled or disabled by the operator.
    #[serde(default)]
    pub collectors: HashMap<String, bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrueNasConfig {
    /// Default target used when a scrape does not name one
    #[serde(default)]
    pub host: String,
    pub api_key: SecretString,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExporterConfig {
    /// Prefix of every metric this exporter produces
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Maximum number of parallel scrape requests (0 disables the limit)
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    /// Serve only exporter metrics on /metrics, leaving /probe as the scrape path
    #[serde(default)]
    pub disable_exporter_target: bool,
    /// Leave exporter self-metrics out of /metrics
    #[serde(default = "default_true")]
    pub disable_exporter_metrics: bool,
    /// Only collectors explicitly listed under `[collectors]` take part in scrapes
    #[serde(default)]
    pub disable_default_collectors: bool,
    /// Query parameters forwarded from /probe to every sub-collector
    #[serde(default)]
    pub extra_params: Vec<String>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            max_requests: default_max_requests(),
            disable_exporter_target: false,
            disable_exporter_metrics: default_true(),
            disable_default_collectors: false,
            extra_params: Vec::new(),
        }
    }
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9169
}

fn default_namespace() -> String {
    "truenas".to_string()
}

fn default_max_requests() -> usize {
    20
}

fn default_use_tls() -> bool {
    false
}

fn default_verify_ssl() -> bool {
    true
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        // Load environment variables from .env if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("TRUENAS_EXPORTER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Reject settings that would only fail later, at scrape time
    pub fn validate(&self) -> Result<()> {
        if !is_valid_namespace(&self.exporter.namespace) {
            bail!(
                "namespace '{}' is not a valid metric name prefix",
                self.exporter.namespace
            );
        }
        if self.server.port == 0 {
            bail!("server port must be non-zero");
        }
        if let Some(name) = self.collectors.keys().find(|n| is_reserved_name(n)) {
            bail!("collector name '{}' is reserved", name);
        }
        if let Some(param) = self
            .exporter
            .extra_params
            .iter()
            .find(|p| p.as_str() == "target" || p.is_empty())
        {
            bail!("extra parameter '{}' is not allowed", param);
        }
        Ok(())
    }
}
