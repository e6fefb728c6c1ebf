//! Alert Metrics Collector
//!
//! Collects system alert information aggregated by severity and status.
//!
//! # Metrics Produced
//! - `<ns>_alert_count` - Number of system alerts by severity and status
//!   - Labels: level, active
//! - `<ns>_alert_info` - Detailed alert information (value is always 1)
//!   - Labels: level, message, uuid, active

use super::collect_with_handler;
use crate::error::Result;
use crate::metrics::{build_fq_name, MetricDesc, MetricSink};
use crate::scrape::{Collector, ExtraParams};
use crate::truenas::types::Alert;
use crate::truenas::{RpcCall, TrueNasClient, TrueNasSession};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::Span;

const LEVELS: [&str; 4] = ["CRITICAL", "ERROR", "WARNING", "INFO"];

pub struct AlertCollector {
    span: Span,
}

impl AlertCollector {
    pub fn new(span: Span) -> Self {
        Self { span }
    }
}

#[async_trait]
impl Collector<TrueNasClient> for AlertCollector {
    async fn update(
        &self,
        sink: &MetricSink,
        namespace: &str,
        client: &TrueNasClient,
        session: &TrueNasSession,
        _params: &ExtraParams,
    ) -> anyhow::Result<()> {
        let call = RpcCall::with_params("alert.list", serde_json::json!([]));
        collect_with_handler(
            &self.span,
            "alerts",
            client.query::<Vec<Alert>>(session, &call),
            |alerts| emit_alerts(sink, namespace, &alerts),
        )
        .await
    }
}

/// Emits a count for every known level and state, zero included, so a cleared
/// alert shows up as 0 rather than as a missing series.
fn emit_alerts(sink: &MetricSink, namespace: &str, alerts: &[Alert]) -> Result<()> {
    let count = MetricDesc::new(
        build_fq_name(namespace, "alert", "count"),
        "Number of system alerts by severity and status",
        &["level", "active"],
    );
    let info = MetricDesc::new(
        build_fq_name(namespace, "alert", "info"),
        "Detailed alert information (value is always 1)",
        &["level", "message", "uuid", "active"],
    );

    let mut counts: BTreeMap<(String, bool), f64> = BTreeMap::new();
    for level in LEVELS {
        for active in [true, false] {
            counts.insert((level.to_string(), active), 0.0);
        }
    }

    for alert in alerts {
        let active = alert.is_active();
        *counts.entry((alert.level.clone(), active)).or_insert(0.0) += 1.0;
        sink.emit(
            &info,
            &[
                &alert.level,
                &alert.formatted,
                &alert.uuid,
                bool_label(active),
            ],
            1.0,
        )?;
    }

    for ((level, active), n) in counts {
        sink.emit(&count, &[&level, bool_label(active)], n)?;
    }
    Ok(())
}

fn bool_label(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
