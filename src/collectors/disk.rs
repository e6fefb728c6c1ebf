//! Disk Information Metrics Collector
//!
//! Collects disk information including serial numbers, models, and sizes.
//!
//! # Metrics Produced
//! - `<ns>_disk_info` - Disk information (value is always 1)
//!   - Labels: disk, serial, model
//! - `<ns>_disk_size_bytes` - Disk capacity
//!   - Labels: disk

use super::collect_with_handler;
use crate::metrics::{build_fq_name, MetricDesc, MetricSink};
use crate::scrape::{Collector, ExtraParams};
use crate::truenas::types::DiskInfo;
use crate::truenas::{RpcCall, TrueNasClient, TrueNasSession};
use async_trait::async_trait;
use tracing::Span;

pub struct DiskCollector {
    span: Span,
}

impl DiskCollector {
    pub fn new(span: Span) -> Self {
        Self { span }
    }
}

#[async_trait]
impl Collector<TrueNasClient> for DiskCollector {
    async fn update(
        &self,
        sink: &MetricSink,
        namespace: &str,
        client: &TrueNasClient,
        session: &TrueNasSession,
        _params: &ExtraParams,
    ) -> anyhow::Result<()> {
        let info = MetricDesc::new(
            build_fq_name(namespace, "disk", "info"),
            "Disk information (value is always 1)",
            &["disk", "serial", "model"],
        );
        let size = MetricDesc::new(
            build_fq_name(namespace, "disk", "size_bytes"),
            "Disk capacity in bytes",
            &["disk"],
        );

        let call = RpcCall::with_params("disk.query", serde_json::json!([]));
        collect_with_handler(
            &self.span,
            "disks",
            client.query::<Vec<DiskInfo>>(session, &call),
            |disks| {
                for disk in disks {
                    sink.emit(&info, &[&disk.name, &disk.serial, &disk.model], 1.0)?;
                    sink.emit(&size, &[&disk.name], disk.size as f64)?;
                }
                Ok(())
            },
        )
        .await
    }
}
