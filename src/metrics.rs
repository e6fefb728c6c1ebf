//! Metric Model and Exposition
//!
//! This module defines the sample stream that flows from sub-collectors to the
//! HTTP layer, the two synthetic scrape series, and the exporter's own metrics.
//!
//! # Sample Flow
//!
//! ```text
//! ┌──────────────┐  MetricSink (mpsc)  ┌────────────────┐  TextEncoder  ┌────────────┐
//! │ Sub-collector│ ──────────────────► │ SampleReceiver │ ────────────► │ Prometheus │
//! │    tasks     │  concurrent sends   │ + render()     │  per scrape   │   scrape   │
//! └──────────────┘                     └────────────────┘               └────────────┘
//! ```
//!
//! Samples are gauge values bound to a [`MetricDesc`]. At render time they are
//! grouped by descriptor into a throwaway `prometheus::Registry`, so nothing is
//! cached between scrapes.
//!
//! # Scrape Series
//!
//! - `<namespace>_scrape_collector_duration_seconds{collector}`
//! - `<namespace>_scrape_collector_success{collector}`

use crate::error::{ExporterError, Result};
#[cfg(target_os = "linux")]
use prometheus::process_collector::ProcessCollector;
use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, PartialEq)]
struct DescInner {
    fq_name: String,
    help: String,
    label_names: Vec<String>,
}

/// Static description of a gauge series: name, help and label schema
///
/// Cheap to clone; every sample holds a reference to its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDesc(Arc<DescInner>);

impl MetricDesc {
    pub fn new(fq_name: impl Into<String>, help: impl Into<String>, label_names: &[&str]) -> Self {
        Self(Arc::new(DescInner {
            fq_name: fq_name.into(),
            help: help.into(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
        }))
    }

    pub fn fq_name(&self) -> &str {
        &self.0.fq_name
    }

    pub fn help(&self) -> &str {
        &self.0.help
    }

    pub fn label_names(&self) -> &[String] {
        &self.0.label_names
    }

    /// Bind label values and a value to this descriptor
    ///
    /// Fails if the number of label values does not match the label schema.
    pub fn sample(&self, label_values: &[&str], value: f64) -> Result<Sample> {
        if label_values.len() != self.0.label_names.len() {
            return Err(ExporterError::InvalidSample(format!(
                "{} expects {} label values, got {}",
                self.0.fq_name,
                self.0.label_names.len(),
                label_values.len()
            )));
        }
        Ok(Sample {
            desc: self.clone(),
            label_values: label_values.iter().map(|v| v.to_string()).collect(),
            value,
        })
    }
}

/// One value of one series
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    desc: MetricDesc,
    label_values: Vec<String>,
    value: f64,
}

impl Sample {
    pub fn desc(&self) -> &MetricDesc {
        &self.desc
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Value of the named label, if the descriptor has it
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .label_names()
            .iter()
            .position(|n| n == name)
            .map(|i| self.label_values[i].as_str())
    }
}

/// Joins the non-empty parts with `_`
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Whether `namespace` can prefix the scrape series; empty means no prefix
pub fn is_valid_namespace(namespace: &str) -> bool {
    is_valid_metric_name(&build_fq_name(namespace, "scrape", "collector_success"))
}

/// Sending half of a scrape's sample stream
///
/// Clones share the same channel, so concurrent sub-collectors can write to it
/// without further coordination. Ordering across senders is unspecified.
#[derive(Debug, Clone)]
pub struct MetricSink {
    tx: mpsc::UnboundedSender<Sample>,
}

impl MetricSink {
    pub fn send(&self, sample: Sample) {
        if self.tx.send(sample).is_err() {
            debug!("Sample receiver dropped, discarding sample");
        }
    }

    /// Build a sample for `desc` and send it
    pub fn emit(&self, desc: &MetricDesc, label_values: &[&str], value: f64) -> Result<()> {
        self.send(desc.sample(label_values, value)?);
        Ok(())
    }

    /// Emit 1.0 for `true` and 0.0 for `false`
    pub fn emit_bool(&self, desc: &MetricDesc, label_values: &[&str], value: bool) -> Result<()> {
        self.emit(desc, label_values, if value { 1.0 } else { 0.0 })
    }
}

/// Receiving half of a scrape's sample stream
#[derive(Debug)]
pub struct SampleReceiver {
    rx: mpsc::UnboundedReceiver<Sample>,
}

impl SampleReceiver {
    /// Everything sent so far, in arrival order
    pub fn drain(&mut self) -> Vec<Sample> {
        let mut samples = Vec::new();
        while let Ok(sample) = self.rx.try_recv() {
            samples.push(sample);
        }
        samples
    }
}

pub fn sample_channel() -> (MetricSink, SampleReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MetricSink { tx }, SampleReceiver { rx })
}

/// The duration/success descriptors every scrape produces
#[derive(Debug, Clone)]
pub struct ScrapeMetrics {
    pub duration: MetricDesc,
    pub success: MetricDesc,
}

impl ScrapeMetrics {
    pub fn new(namespace: &str) -> Self {
        Self {
            duration: MetricDesc::new(
                build_fq_name(namespace, "scrape", "collector_duration_seconds"),
                "Duration of a collector scrape.",
                &["collector"],
            ),
            success: MetricDesc::new(
                build_fq_name(namespace, "scrape", "collector_success"),
                "Whether a collector succeeded.",
                &["collector"],
            ),
        }
    }
}

struct Family {
    desc: MetricDesc,
    vec: GaugeVec,
}

impl Family {
    fn register(registry: &Registry, desc: &MetricDesc) -> prometheus::Result<Self> {
        let labels: Vec<&str> = desc.label_names().iter().map(String::as_str).collect();
        let vec = GaugeVec::new(Opts::new(desc.fq_name(), desc.help()), &labels)?;
        registry.register(Box::new(vec.clone()))?;
        Ok(Self {
            desc: desc.clone(),
            vec,
        })
    }

    fn observe(&self, sample: &Sample) -> prometheus::Result<()> {
        let values: Vec<&str> = sample.label_values().iter().map(String::as_str).collect();
        self.vec
            .get_metric_with_label_values(values.as_slice())?
            .set(sample.value());
        Ok(())
    }
}

/// Render a scrape's samples, after any long-lived registries, in text format
///
/// Samples whose descriptor clashes with an earlier one of the same name are
/// logged and skipped; the rest of the scrape is still rendered.
pub fn render(samples: &[Sample], registries: &[&Registry]) -> anyhow::Result<String> {
    let registry = Registry::new();
    let mut families: HashMap<&str, Family> = HashMap::new();

    for sample in samples {
        let family = match families.entry(sample.desc().fq_name()) {
            Entry::Occupied(entry) => {
                if entry.get().desc != *sample.desc() {
                    warn!(
                        metric = sample.desc().fq_name(),
                        "Inconsistent descriptor for metric, dropping sample"
                    );
                    continue;
                }
                entry.into_mut()
            }
            Entry::Vacant(entry) => match Family::register(&registry, sample.desc()) {
                Ok(family) => entry.insert(family),
                Err(e) => {
                    warn!(metric = sample.desc().fq_name(), error = %e, "Invalid metric, dropping sample");
                    continue;
                }
            },
        };

        if let Err(e) = family.observe(sample) {
            warn!(metric = sample.desc().fq_name(), error = %e, "Failed to record sample");
        }
    }

    let mut metric_families: Vec<_> = registries.iter().flat_map(|r| r.gather()).collect();
    metric_families.extend(registry.gather());

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// The exporter's own metrics, kept across scrapes
///
/// `build_info` lives in its own registry because every scrape carries it; the
/// process and request metrics are only rendered when exporter metrics are on.
#[derive(Clone)]
pub struct ExporterMetrics {
    version_registry: Arc<Registry>,
    registry: Arc<Registry>,
    pub build_info: Arc<IntGaugeVec>,
    pub scrape_requests: Arc<IntCounterVec>,
}

impl ExporterMetrics {
    pub fn new(namespace: &str) -> Result<Self> {
        let subsystem = build_fq_name(namespace, "", "exporter");

        let build_info = IntGaugeVec::new(
            Opts::new(
                "build_info",
                "Exporter build information (value is always 1)",
            )
            .subsystem(subsystem.as_str()),
            &["version"],
        )?;
        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1);

        let version_registry = Registry::new();
        version_registry.register(Box::new(build_info.clone()))?;

        let scrape_requests = IntCounterVec::new(
            Opts::new(
                "scrape_requests_total",
                "Scrape requests served, by handler and HTTP status code",
            )
            .subsystem(subsystem.as_str()),
            &["handler", "code"],
        )?;

        let registry = Registry::new();
        registry.register(Box::new(scrape_requests.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(ProcessCollector::for_self()))?;

        Ok(Self {
            version_registry: Arc::new(version_registry),
            registry: Arc::new(registry),
            build_info: Arc::new(build_info),
            scrape_requests: Arc::new(scrape_requests),
        })
    }

    /// Registry holding only `build_info`
    pub fn version_registry(&self) -> &Registry {
        &self.version_registry
    }

    /// Process and request metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registries to render with a scrape's samples
    pub fn registries(&self, include_exporter_metrics: bool) -> Vec<&Registry> {
        let mut registries = vec![self.version_registry()];
        if include_exporter_metrics {
            registries.push(self.registry());
        }
        registries
    }

    /// Render only the exporter's own metrics
    pub fn render(&self) -> anyhow::Result<String> {
        render(&[], &self.registries(true))
    }

    pub fn record_request(&self, handler: &str, code: u16) {
        let code = code.to_string();
        self.scrape_requests
            .with_label_values(&[handler, code.as_str()])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fq_name_skips_empty_parts() {
        assert_eq!(build_fq_name("ns", "scrape", "x"), "ns_scrape_x");
        assert_eq!(build_fq_name("", "scrape", "x"), "scrape_x");
        assert_eq!(build_fq_name("ns", "", "x"), "ns_x");
    }

    #[test]
    fn metric_name_validation() {
        assert!(is_valid_metric_name("truenas"));
        assert!(is_valid_metric_name("_a:b_1"));
        assert!(!is_valid_metric_name(""));
        assert!(!is_valid_metric_name("1abc"));
        assert!(!is_valid_metric_name("with-dash"));
    }

    #[test]
    fn empty_namespace_is_valid() {
        assert!(is_valid_namespace(""));
        assert!(is_valid_namespace("truenas"));
        assert!(!is_valid_namespace("1abc"));
        assert!(!is_valid_namespace("bad-namespace"));
    }

    #[test]
    fn sample_rejects_wrong_label_count() {
        let desc = MetricDesc::new("x_total", "help", &["a", "b"]);
        assert!(desc.sample(&["only-one"], 1.0).is_err());
        let sample = desc.sample(&["1", "2"], 3.0).unwrap();
        assert_eq!(sample.label("b"), Some("2"));
        assert_eq!(sample.label("c"), None);
    }
}
