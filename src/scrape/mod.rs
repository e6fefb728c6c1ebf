//! Scrape Orchestration Core
//!
//! This module binds a target, a set of pluggable sub-collectors and a session
//! client into one scrapeable unit.
//!
//! # Architecture
//!
//! ```text
//!                   ┌───────────────────┐
//!   register() ───► │ CollectorRegistry │  name → factory, enabled flag, cached instance
//!                   └─────────┬─────────┘
//!                             │ build_set(namespace, target, params)
//!                             ▼
//!                   ┌───────────────────┐   login ──► fan-out update() ──► join ──► logout
//!                   │   CollectorSet    │ ─────────────────────────────────────────────────►
//!                   └───────────────────┘                  MetricSink
//! ```
//!
//! # Plugin Contracts
//!
//! - [`SessionClient`] - one adapter per remote system, parameterized per scrape by target
//! - [`Collector`] - one sub-collector per category of domain metrics
//!
//! A sub-collector error only means that collector's data is absent from this
//! scrape. It is reported through `<namespace>_scrape_collector_success` and never
//! fails the scrape as a whole.

use crate::error::Result;
use crate::metrics::MetricSink;
use async_trait::async_trait;
use std::collections::HashMap;

pub mod registry;
pub mod set;

pub use registry::{CollectorFactory, CollectorRegistry};
pub use set::{CollectorSet, ScrapeSummary};

/// Extra per-scrape parameters forwarded to every sub-collector
pub type ExtraParams = HashMap<String, String>;

/// Label used for the session login duration
pub const LOGIN: &str = "login";
/// Label used for the session logout duration
pub const LOGOUT: &str = "logout";
/// Label used for the whole scrape's duration
pub const ALL_COLLECTORS: &str = "all_collectors";

/// Names a sub-collector may not be registered under
pub const RESERVED_NAMES: [&str; 3] = [LOGIN, LOGOUT, ALL_COLLECTORS];

pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// State of one login-to-logout window
///
/// Each session client defines its own session type; the orchestrator only
/// needs to know which target was actually reached.
pub trait Session: Send + Sync + 'static {
    /// Target the session is connected to (may differ from the requested one)
    fn target(&self) -> &str;
}

/// Adapter for one kind of remote system
///
/// `fetch` may be called concurrently by several sub-collectors sharing the same
/// session. If the underlying protocol cannot handle that, the adapter must
/// serialize internally.
#[async_trait]
pub trait SessionClient: Send + Sync + 'static {
    type Session: Session;
    type Query: Send + Sync;
    type Payload: Send;

    /// Open a session. An empty target selects the adapter's default.
    async fn login(&self, target: &str) -> Result<Self::Session>;

    async fn fetch(&self, session: &Self::Session, query: &Self::Query) -> Result<Self::Payload>;

    async fn logout(&self, session: &Self::Session) -> Result<()>;
}

/// A pluggable sub-collector
///
/// Implementations translate what they fetch into samples on `sink`. They must
/// not keep the sink or session beyond the call.
#[async_trait]
pub trait Collector<C: SessionClient>: Send + Sync + 'static {
    async fn update(
        &self,
        sink: &MetricSink,
        namespace: &str,
        client: &C,
        session: &C::Session,
        params: &ExtraParams,
    ) -> anyhow::Result<()>;
}
