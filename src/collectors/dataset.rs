//! Dataset Metrics Collector
//!
//! Collects ZFS dataset usage, compression, and encryption information.
//!
//! The optional `pool` scrape parameter restricts the query to datasets of one
//! pool, e.g. `/probe?target=nas&pool=tank` with `extra_params = ["pool"]`.
//!
//! # Metrics Produced
//! - `<ns>_dataset_used_bytes` - Used bytes of the dataset
//!   - Labels: dataset, pool
//! - `<ns>_dataset_available_bytes` - Available bytes for the dataset
//!   - Labels: dataset, pool
//! - `<ns>_dataset_compression_ratio` - Compression ratio of the dataset
//!   - Labels: dataset, pool
//! - `<ns>_dataset_encrypted` - Encryption status (1=encrypted, 0=unencrypted)
//!   - Labels: dataset, pool

use super::collect_with_handler;
use crate::error::Result;
use crate::metrics::{build_fq_name, MetricDesc, MetricSink};
use crate::scrape::{Collector, ExtraParams};
use crate::truenas::types::Dataset;
use crate::truenas::{RpcCall, TrueNasClient, TrueNasSession};
use async_trait::async_trait;
use tracing::Span;

pub struct DatasetCollector {
    span: Span,
}

impl DatasetCollector {
    pub fn new(span: Span) -> Self {
        Self { span }
    }
}

/// Builds the `pool.dataset.query` call, filtered by the `pool` parameter if present
pub fn dataset_query(params: &ExtraParams) -> RpcCall {
    let filters = match params.get("pool").filter(|p| !p.is_empty()) {
        Some(pool) => serde_json::json!([["pool", "=", pool]]),
        None => serde_json::json!([]),
    };
    RpcCall::with_params(
        "pool.dataset.query",
        serde_json::json!([
            filters,
            {"select": ["name", "used", "available", "compressratio", "encrypted"]}
        ]),
    )
}

#[async_trait]
impl Collector<TrueNasClient> for DatasetCollector {
    async fn update(
        &self,
        sink: &MetricSink,
        namespace: &str,
        client: &TrueNasClient,
        session: &TrueNasSession,
        params: &ExtraParams,
    ) -> anyhow::Result<()> {
        let call = dataset_query(params);
        collect_with_handler(
            &self.span,
            "datasets",
            client.query::<Vec<Dataset>>(session, &call),
            |datasets| emit_datasets(sink, namespace, &datasets),
        )
        .await
    }
}

fn emit_datasets(sink: &MetricSink, namespace: &str, datasets: &[Dataset]) -> Result<()> {
    let name = |metric: &str| build_fq_name(namespace, "dataset", metric);
    let labels = ["dataset", "pool"];
    let used = MetricDesc::new(name("used_bytes"), "Used bytes of the dataset", &labels);
    let available = MetricDesc::new(
        name("available_bytes"),
        "Available bytes for the dataset",
        &labels,
    );
    let compression = MetricDesc::new(
        name("compression_ratio"),
        "Compression ratio of the dataset",
        &labels,
    );
    let encrypted = MetricDesc::new(
        name("encrypted"),
        "Encryption status of the dataset (1=encrypted, 0=unencrypted)",
        &labels,
    );

    for dataset in datasets {
        let values = [dataset.name.as_str(), dataset.pool()];

        if let Some(v) = &dataset.used {
            sink.emit(&used, &values, v.parsed as f64)?;
        }
        if let Some(v) = &dataset.available {
            sink.emit(&available, &values, v.parsed as f64)?;
        }
        if let Some(ratio) = dataset.compression_ratio() {
            sink.emit(&compression, &values, ratio)?;
        }
        sink.emit_bool(&encrypted, &values, dataset.encrypted)?;
    }
    Ok(())
}
