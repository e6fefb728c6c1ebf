//! Pool Metrics Collector
//!
//! Collects ZFS pool health, capacity, scrub information, and VDev error counts.
//!
//! # Metrics Produced
//! - `<ns>_pool_health` - Pool health status (1=healthy, 0=unhealthy)
//!   - Labels: pool, status
//! - `<ns>_pool_capacity_bytes` - Total storage capacity of the ZFS pool
//!   - Labels: pool
//! - `<ns>_pool_allocated_bytes` - Used storage capacity of the ZFS pool
//!   - Labels: pool
//! - `<ns>_pool_free_bytes` - Free storage capacity of the ZFS pool
//!   - Labels: pool
//! - `<ns>_pool_scrub_errors` - Number of errors found during last ZFS scrub
//!   - Labels: pool
//! - `<ns>_pool_last_scrub_seconds` - Timestamp of the last ZFS scrub
//!   - Labels: pool
//! - `<ns>_pool_vdev_error_count` - ZFS vdev error counts (read/write/checksum)
//!   - Labels: pool, vdev, type

use super::collect_with_handler;
use crate::error::Result;
use crate::metrics::{build_fq_name, MetricDesc, MetricSink};
use crate::scrape::{Collector, ExtraParams};
use crate::truenas::types::{Pool, VDev};
use crate::truenas::{RpcCall, TrueNasClient, TrueNasSession};
use async_trait::async_trait;
use tracing::{debug, Span};

struct PoolMetrics {
    health: MetricDesc,
    capacity_bytes: MetricDesc,
    allocated_bytes: MetricDesc,
    free_bytes: MetricDesc,
    scrub_errors: MetricDesc,
    last_scrub_seconds: MetricDesc,
    vdev_error_count: MetricDesc,
}

impl PoolMetrics {
    fn new(namespace: &str) -> Self {
        let name = |metric: &str| build_fq_name(namespace, "pool", metric);
        Self {
            health: MetricDesc::new(
                name("health"),
                "Pool health status (1=healthy, 0=unhealthy)",
                &["pool", "status"],
            ),
            capacity_bytes: MetricDesc::new(
                name("capacity_bytes"),
                "Total storage capacity of the ZFS pool",
                &["pool"],
            ),
            allocated_bytes: MetricDesc::new(
                name("allocated_bytes"),
                "Used storage capacity of the ZFS pool",
                &["pool"],
            ),
            free_bytes: MetricDesc::new(
                name("free_bytes"),
                "Free storage capacity of the ZFS pool",
                &["pool"],
            ),
            scrub_errors: MetricDesc::new(
                name("scrub_errors"),
                "Number of errors found during last ZFS scrub",
                &["pool"],
            ),
            last_scrub_seconds: MetricDesc::new(
                name("last_scrub_seconds"),
                "Timestamp of the last ZFS scrub",
                &["pool"],
            ),
            vdev_error_count: MetricDesc::new(
                name("vdev_error_count"),
                "ZFS vdev error counts (read/write/checksum)",
                &["pool", "vdev", "type"],
            ),
        }
    }
}

pub struct PoolCollector {
    span: Span,
}

impl PoolCollector {
    pub fn new(span: Span) -> Self {
        Self { span }
    }
}

#[async_trait]
impl Collector<TrueNasClient> for PoolCollector {
    async fn update(
        &self,
        sink: &MetricSink,
        namespace: &str,
        client: &TrueNasClient,
        session: &TrueNasSession,
        _params: &ExtraParams,
    ) -> anyhow::Result<()> {
        let call = RpcCall::with_params("pool.query", serde_json::Value::Null);
        collect_with_handler(
            &self.span,
            "pools",
            client.query::<Vec<Pool>>(session, &call),
            |pools| emit_pools(sink, &PoolMetrics::new(namespace), &pools),
        )
        .await
    }
}

fn emit_pools(sink: &MetricSink, metrics: &PoolMetrics, pools: &[Pool]) -> Result<()> {
    for pool in pools {
        let labels = [pool.name.as_str()];
        sink.emit_bool(
            &metrics.health,
            &[pool.name.as_str(), pool.status.as_str()],
            pool.healthy,
        )?;
        sink.emit(&metrics.capacity_bytes, &labels, pool.size as f64)?;
        sink.emit(&metrics.allocated_bytes, &labels, pool.allocated as f64)?;
        sink.emit(&metrics.free_bytes, &labels, pool.free as f64)?;

        if let Some(scan) = &pool.scan {
            sink.emit(
                &metrics.scrub_errors,
                &labels,
                scan.errors.unwrap_or_default() as f64,
            )?;
            if let Some(end_time) = scan.end_time {
                sink.emit(&metrics.last_scrub_seconds, &labels, end_time.as_seconds())?;
            }
        }

        if let Some(topology) = &pool.topology {
            for vdev in &topology.data {
                emit_vdev_stats(sink, metrics, &pool.name, vdev)?;
            }
        }

        debug!(
            "Pool {} (status: {}, healthy: {})",
            pool.name, pool.status, pool.healthy
        );
    }
    Ok(())
}

/// Walks the VDev tree, emitting read/write/checksum errors for every node
fn emit_vdev_stats(
    sink: &MetricSink,
    metrics: &PoolMetrics,
    pool_name: &str,
    vdev: &VDev,
) -> Result<()> {
    if let Some(stats) = &vdev.stats {
        for (kind, count) in stats.by_kind() {
            sink.emit(
                &metrics.vdev_error_count,
                &[pool_name, vdev.label(), kind],
                count as f64,
            )?;
        }
    }
    for child in &vdev.children {
        emit_vdev_stats(sink, metrics, pool_name, child)?;
    }
    Ok(())
}
