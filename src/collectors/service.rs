//! Service Status Metrics Collector
//!
//! # Metrics Produced
//! - `<ns>_service_status` - Service status (0=stopped, 1=running)
//!   - Labels: service
//! - `<ns>_service_enabled` - Whether the service starts on boot
//!   - Labels: service

use super::collect_with_handler;
use crate::metrics::{build_fq_name, MetricDesc, MetricSink};
use crate::scrape::{Collector, ExtraParams};
use crate::truenas::types::ServiceInfo;
use crate::truenas::{RpcCall, TrueNasClient, TrueNasSession};
use async_trait::async_trait;
use tracing::Span;

pub struct ServiceCollector {
    span: Span,
}

impl ServiceCollector {
    pub fn new(span: Span) -> Self {
        Self { span }
    }
}

#[async_trait]
impl Collector<TrueNasClient> for ServiceCollector {
    async fn update(
        &self,
        sink: &MetricSink,
        namespace: &str,
        client: &TrueNasClient,
        session: &TrueNasSession,
        _params: &ExtraParams,
    ) -> anyhow::Result<()> {
        let status = MetricDesc::new(
            build_fq_name(namespace, "service", "status"),
            "Service status (0=stopped, 1=running)",
            &["service"],
        );
        let enabled = MetricDesc::new(
            build_fq_name(namespace, "service", "enabled"),
            "Whether the service starts on boot (1=enabled, 0=disabled)",
            &["service"],
        );

        let call = RpcCall::with_params("service.query", serde_json::json!([]));
        collect_with_handler(
            &self.span,
            "services",
            client.query::<Vec<ServiceInfo>>(session, &call),
            |services| {
                for service in services {
                    sink.emit_bool(&status, &[&service.service], service.is_running())?;
                    sink.emit_bool(&enabled, &[&service.service], service.enable)?;
                }
                Ok(())
            },
        )
        .await
    }
}
