//! TrueNAS Sub-collectors
//!
//! Each module here implements [`Collector`](crate::scrape::Collector) for
//! [`TrueNasClient`] and covers one category of TrueNAS metrics.
//!
//! # Architecture
//!
//! Collectors follow a consistent pattern:
//! - Hold the tracing span handed to their factory
//! - Fetch one API endpoint through the scrape's session
//! - Turn the response into samples on the scrape's sink
//! - Return an error when the data could not be fetched
//!
//! # Error Handling
//!
//! A returned error only means this collector's data is missing from the scrape.
//! The orchestrator logs it and reports `<namespace>_scrape_collector_success 0`.

use crate::error::Result;
use crate::scrape::{Collector, CollectorRegistry};
use crate::truenas::TrueNasClient;
use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, Span};

pub mod alert;
pub mod dataset;
pub mod disk;
pub mod pool;
pub mod service;
pub mod system_info;

pub use alert::AlertCollector;
pub use dataset::DatasetCollector;
pub use disk::DiskCollector;
pub use pool::PoolCollector;
pub use service::ServiceCollector;
pub use system_info::SystemInfoCollector;

/// Register every bundled collector with its default state
///
/// `dataset` is opt-in because large systems expose thousands of datasets.
pub fn register_all(registry: &CollectorRegistry<TrueNasClient>) -> Result<()> {
    registry.register("alert", true, |span| Ok(arc(AlertCollector::new(span))))?;
    registry.register("dataset", false, |span| {
        Ok(arc(DatasetCollector::new(span)))
    })?;
    registry.register("disk", true, |span| Ok(arc(DiskCollector::new(span))))?;
    registry.register("pool", true, |span| Ok(arc(PoolCollector::new(span))))?;
    registry.register("service", true, |span| {
        Ok(arc(ServiceCollector::new(span)))
    })?;
    registry.register("system_info", true, |span| {
        Ok(arc(SystemInfoCollector::new(span)))
    })?;
    Ok(())
}

fn arc<T: Collector<TrueNasClient>>(collector: T) -> Arc<dyn Collector<TrueNasClient>> {
    Arc::new(collector)
}

/// Helper to reduce boilerplate in collectors
///
/// Awaits the query, then runs `process` on the data inside the collector's
/// span. A failed query or a failed sample is returned as the collector's error.
///
/// # Arguments
///
/// * `span` - Span the collector was created with
/// * `name` - Name of the data being collected (for logging and errors)
/// * `query_future` - Async API call that returns data
/// * `process` - Function that turns the data into samples
pub async fn collect_with_handler<T, F, P>(
    span: &Span,
    name: &str,
    query_future: F,
    process: P,
) -> anyhow::Result<()>
where
    F: Future<Output = Result<T>>,
    P: FnOnce(T) -> Result<()>,
{
    let data = query_future
        .await
        .with_context(|| format!("failed to query {}", name))?;

    span.in_scope(|| {
        process(data).with_context(|| format!("failed to process {}", name))?;
        debug!("Updated {} metrics", name);
        Ok(())
    })
}
