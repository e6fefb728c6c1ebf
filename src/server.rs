//! HTTP Server
//!
//! Exposes scrapes over HTTP. Every request runs a fresh scrape; nothing is
//! cached between requests.
//!
//! # Endpoints
//!
//! - `GET /` - HTML landing page
//! - `GET /metrics` - Scrape of the default target (plus exporter metrics unless disabled)
//!
//! Every scrape carries `<namespace>_exporter_build_info`.
//! - `GET /probe?target=<host>` - Scrape of the given target; configured extra
//!   parameters are read from the same query string
//! - `GET /health` - Liveness check
//!
//! # Status Codes
//!
//! - `200` - Scrape ran; failed sub-collectors show up as `*_collector_success 0`
//! - `400` - `/probe` without a target
//! - `500` - The collector set could not be built
//! - `503` - Login to the target failed, or too many scrapes are in flight

use crate::config::Config;
use crate::metrics::{render, sample_channel, ExporterMetrics};
use crate::scrape::{CollectorRegistry, CollectorSet, ExtraParams, SessionClient};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

pub struct AppState<C: SessionClient> {
    namespace: String,
    extra_params: Vec<String>,
    include_exporter_metrics: bool,
    registry: Arc<CollectorRegistry<C>>,
    /// Reused for every /metrics request; `None` when the default target is disabled
    default_set: Option<Arc<CollectorSet<C>>>,
    exporter_metrics: ExporterMetrics,
    limiter: Option<Arc<Semaphore>>,
}

impl<C: SessionClient> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            extra_params: self.extra_params.clone(),
            include_exporter_metrics: self.include_exporter_metrics,
            registry: Arc::clone(&self.registry),
            default_set: self.default_set.clone(),
            exporter_metrics: self.exporter_metrics.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

impl<C: SessionClient> AppState<C> {
    pub fn new(config: &Config, registry: Arc<CollectorRegistry<C>>) -> anyhow::Result<Self> {
        let exporter = &config.exporter;
        let exporter_metrics = ExporterMetrics::new(&exporter.namespace)?;

        let default_set = if exporter.disable_exporter_target {
            info!("/metrics target is disabled, serving exporter metrics only");
            None
        } else {
            let set = registry.build_set(&exporter.namespace, "", ExtraParams::new())?;
            info!(
                collectors = ?set.collector_names(),
                "Default collector set ready"
            );
            Some(Arc::new(set))
        };

        Ok(Self {
            namespace: exporter.namespace.clone(),
            extra_params: exporter.extra_params.clone(),
            // Without a default target, /metrics always carries exporter metrics
            include_exporter_metrics: !exporter.disable_exporter_metrics || default_set.is_none(),
            registry,
            default_set,
            exporter_metrics,
            limiter: (exporter.max_requests > 0)
                .then(|| Arc::new(Semaphore::new(exporter.max_requests))),
        })
    }
}

pub fn create_router<C: SessionClient>(state: AppState<C>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler::<C>))
        .route("/probe", get(probe_handler::<C>))
        .route("/health", get(health_handler))
        .with_state(state)
}

pub async fn start<C: SessionClient>(
    config: Config,
    registry: Arc<CollectorRegistry<C>>,
) -> anyhow::Result<()> {
    let state = AppState::new(&config, registry)?;
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.addr, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Metrics server listening on {}", addr);
    info!("Metrics available at http://{}/metrics", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Run one scrape and render it, returning the status code to answer with
async fn scrape<C: SessionClient>(
    state: &AppState<C>,
    set: &CollectorSet<C>,
) -> (StatusCode, String) {
    let (sink, mut receiver) = sample_channel();
    let result = set.collect(&sink).await;
    let samples = receiver.drain();

    if let Err(e) = result {
        return (StatusCode::SERVICE_UNAVAILABLE, format!("{}\n", e));
    }

    let registries = state
        .exporter_metrics
        .registries(state.include_exporter_metrics);
    match render(&samples, &registries) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error rendering metrics: {}", e),
            )
        }
    }
}

fn respond<C: SessionClient>(
    state: &AppState<C>,
    handler: &str,
    (status, body): (StatusCode, String),
) -> Response {
    state.exporter_metrics.record_request(handler, status.as_u16());
    (status, body).into_response()
}

fn too_many_requests() -> (StatusCode, String) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "Too many concurrent scrape requests\n".to_string(),
    )
}

async fn root_handler() -> impl IntoResponse {
    axum::response::Html(
        r#"<html>
<head><title>TrueNAS Exporter</title></head>
<body>
<h1>TrueNAS Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
<p><a href="/probe">Probe</a></p>
<p><a href="/health">Health</a></p>
</body>
</html>"#,
    )
}

async fn metrics_handler<C: SessionClient>(State(state): State<AppState<C>>) -> Response {
    let Some(set) = state.default_set.clone() else {
        let result = match state.exporter_metrics.render() {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error rendering metrics: {}", e),
            ),
        };
        return respond(&state, "metrics", result);
    };

    let _permit = match &state.limiter {
        Some(limiter) => match Arc::clone(limiter).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => return respond(&state, "metrics", too_many_requests()),
        },
        None => None,
    };

    let result = scrape(&state, &set).await;
    respond(&state, "metrics", result)
}

async fn probe_handler<C: SessionClient>(
    State(state): State<AppState<C>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let target = match query.get("target").filter(|t| !t.is_empty()) {
        Some(target) => target.clone(),
        None => {
            warn!("No target specified");
            return respond(
                &state,
                "probe",
                (StatusCode::BAD_REQUEST, "'target' parameter is missing\n".to_string()),
            );
        }
    };
    debug!("Scraping {}", target);

    // Every configured parameter is forwarded, empty when absent
    let params: ExtraParams = state
        .extra_params
        .iter()
        .map(|name| (name.clone(), query.get(name).cloned().unwrap_or_default()))
        .collect();

    let _permit = match &state.limiter {
        Some(limiter) => match Arc::clone(limiter).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => return respond(&state, "probe", too_many_requests()),
        },
        None => None,
    };

    let set = match state.registry.build_set(&state.namespace, &target, params) {
        Ok(set) => set,
        Err(e) => {
            error!(target = %target, error = %e, "Could not create collector set");
            return respond(
                &state,
                "probe",
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("could not create {} collector: {}\n", state.namespace, e),
                ),
            );
        }
    };

    let result = scrape(&state, &set).await;
    respond(&state, "probe", result)
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
