//! Multi-target Prometheus Exporter Core
//!
//! A scrape-orchestration core for exporters that log in to a remote system,
//! run a set of pluggable sub-collectors against that session, and log out again,
//! once per scrape. Bundled with a TrueNAS Scale session client and collectors.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   /metrics, /probe   ┌─────────────────────────────────────────┐
//! │ Prometheus │ ───────────────────► │ server                                  │
//! └────────────┘                      │   CollectorRegistry ──► CollectorSet    │
//!                                     │                           │             │
//!                                     │     login ─► update × N ─► logout       │
//!                                     └───────────────┬─────────────────────────┘
//!                                                     │ SessionClient
//!                                                     ▼
//!                                              ┌──────────────┐
//!                                              │ Remote system│
//!                                              └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`scrape`] - Plugin contracts, collector registry and scrape orchestration
//! - [`metrics`] - Sample stream, scrape series and text exposition
//! - [`server`] - HTTP endpoints
//! - [`truenas`] - TrueNAS WebSocket session client
//! - [`collectors`] - TrueNAS sub-collectors
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//!
//! # Quick Start
//!
//! ```no_run
//! use scrape_exporter::{collectors, config::Config, scrape::CollectorRegistry, server};
//! use scrape_exporter::truenas::TrueNasClient;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/Default.toml")?;
//!
//!     let registry = Arc::new(CollectorRegistry::new());
//!     registry.register_session_client(TrueNasClient::new(config.truenas.clone()));
//!     collectors::register_all(&registry)?;
//!
//!     server::start(config, registry).await?;
//!     Ok(())
//! }
//! ```

pub mod collectors;
pub mod config;
pub mod error;
pub mod metrics;
pub mod scrape;
pub mod server;
pub mod truenas;
