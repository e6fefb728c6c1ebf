//! System Information Metrics Collector
//!
//! Collects system information including uptime, memory, and load average.
//!
//! # Metrics Produced
//! - `<ns>_system_info` - TrueNAS system information (value is always 1)
//!   - Labels: hostname, version
//! - `<ns>_system_uptime_seconds` - System uptime in seconds
//! - `<ns>_system_memory_total_bytes` - Total system memory in bytes
//! - `<ns>_system_load_average` - System load average
//!   - Labels: period (1m, 5m, 15m)

use super::collect_with_handler;
use crate::error::Result;
use crate::metrics::{build_fq_name, MetricDesc, MetricSink};
use crate::scrape::{Collector, ExtraParams};
use crate::truenas::types::SystemInfo;
use crate::truenas::{RpcCall, TrueNasClient, TrueNasSession};
use async_trait::async_trait;
use tracing::{debug, Span};

pub struct SystemInfoCollector {
    span: Span,
}

impl SystemInfoCollector {
    pub fn new(span: Span) -> Self {
        Self { span }
    }
}

#[async_trait]
impl Collector<TrueNasClient> for SystemInfoCollector {
    async fn update(
        &self,
        sink: &MetricSink,
        namespace: &str,
        client: &TrueNasClient,
        session: &TrueNasSession,
        _params: &ExtraParams,
    ) -> anyhow::Result<()> {
        collect_with_handler(
            &self.span,
            "system info",
            client.query::<SystemInfo>(session, &RpcCall::new("system.info")),
            |info| emit_system_info(sink, namespace, &info),
        )
        .await
    }
}

fn emit_system_info(sink: &MetricSink, namespace: &str, info: &SystemInfo) -> Result<()> {
    let name = |metric: &str| build_fq_name(namespace, "system", metric);

    sink.emit(
        &MetricDesc::new(
            name("info"),
            "TrueNAS system information (value is always 1)",
            &["hostname", "version"],
        ),
        &[&info.hostname, &info.version],
        1.0,
    )?;
    sink.emit(
        &MetricDesc::new(name("uptime_seconds"), "System uptime in seconds", &[]),
        &[],
        info.uptime_seconds,
    )?;

    if let Some(physmem) = info.physmem {
        sink.emit(
            &MetricDesc::new(
                name("memory_total_bytes"),
                "Total system memory in bytes",
                &[],
            ),
            &[],
            physmem as f64,
        )?;
    }

    // Fewer than three values means the API returned something unexpected
    if let Some([one, five, fifteen, ..]) = info.loadavg.as_deref() {
        let load = MetricDesc::new(name("load_average"), "System load average", &["period"]);
        sink.emit(&load, &["1m"], *one)?;
        sink.emit(&load, &["5m"], *five)?;
        sink.emit(&load, &["15m"], *fifteen)?;
    }

    debug!(
        "System info: {} ({}) - uptime: {:.0}s",
        info.hostname, info.version, info.uptime_seconds
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::sample_channel;

    #[test]
    fn short_loadavg_is_skipped() {
        let info = SystemInfo {
            version: "25.04".to_string(),
            hostname: "nas".to_string(),
            uptime_seconds: 10.0,
            loadavg: Some(vec![0.5]),
            physmem: None,
        };
        let (sink, mut rx) = sample_channel();
        emit_system_info(&sink, "truenas", &info).unwrap();

        let names: Vec<String> = rx
            .drain()
            .iter()
            .map(|s| s.desc().fq_name().to_string())
            .collect();
        assert_eq!(names, vec!["truenas_system_info", "truenas_system_uptime_seconds"]);
    }
}
