//! In-memory session client and sub-collectors shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use scrape_exporter::error::{ExporterError, Result};
use scrape_exporter::metrics::{build_fq_name, sample_channel, MetricDesc, MetricSink, Sample};
use scrape_exporter::scrape::{
    Collector, CollectorRegistry, CollectorSet, ExtraParams, ScrapeSummary, Session, SessionClient,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TARGET: &str = "default.local";

#[derive(Default)]
pub struct FakeState {
    pub fail_login: bool,
    pub fail_logout: bool,
    pub logins: AtomicUsize,
    pub logouts: AtomicUsize,
    pub fetches: AtomicUsize,
    /// "login", "update:<name>", "done:<name>", "logout" in the order they happened
    pub events: Mutex<Vec<String>>,
}

/// Session client that never leaves the process
#[derive(Clone, Default)]
pub struct FakeClient {
    pub state: Arc<FakeState>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_login() -> Self {
        Self {
            state: Arc::new(FakeState {
                fail_login: true,
                ..FakeState::default()
            }),
        }
    }

    pub fn failing_logout() -> Self {
        Self {
            state: Arc::new(FakeState {
                fail_logout: true,
                ..FakeState::default()
            }),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.state.events.lock().clone()
    }

    fn record(&self, event: String) {
        self.state.events.lock().push(event);
    }
}

pub struct FakeSession {
    target: String,
}

impl Session for FakeSession {
    fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl SessionClient for FakeClient {
    type Session = FakeSession;
    type Query = String;
    type Payload = f64;

    async fn login(&self, target: &str) -> Result<FakeSession> {
        self.state.logins.fetch_add(1, Ordering::SeqCst);
        self.record("login".to_string());
        if self.state.fail_login {
            return Err(ExporterError::Auth("bad credentials".to_string()));
        }
        let target = if target.is_empty() {
            DEFAULT_TARGET
        } else {
            target
        };
        Ok(FakeSession {
            target: target.to_string(),
        })
    }

    async fn fetch(&self, _session: &FakeSession, query: &String) -> Result<f64> {
        self.state.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(query.len() as f64)
    }

    async fn logout(&self, _session: &FakeSession) -> Result<()> {
        self.state.logouts.fetch_add(1, Ordering::SeqCst);
        self.record("logout".to_string());
        if self.state.fail_logout {
            return Err(ExporterError::TrueNasApi("logout rejected".to_string()));
        }
        Ok(())
    }
}

/// How a [`FakeCollector`] ends its update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeed,
    Fail,
    Panic,
}

/// Fetches once, emits `<ns>_<name>_value{target}`, then ends as configured
pub struct FakeCollector {
    name: String,
    outcome: Outcome,
    delay: Option<Duration>,
}

impl FakeCollector {
    pub fn new(name: &str, outcome: Outcome) -> Self {
        Self {
            name: name.to_string(),
            outcome,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Collector<FakeClient> for FakeCollector {
    async fn update(
        &self,
        sink: &MetricSink,
        namespace: &str,
        client: &FakeClient,
        session: &FakeSession,
        params: &ExtraParams,
    ) -> anyhow::Result<()> {
        client.record(format!("update:{}", self.name));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let value = client.fetch(session, &self.name).await?;
        let desc = MetricDesc::new(
            build_fq_name(namespace, &self.name, "value"),
            "Fake domain value",
            &["target", "zone"],
        );
        let zone = params.get("zone").map(String::as_str).unwrap_or("");
        sink.emit(&desc, &[session.target(), zone], value)?;
        client.record(format!("done:{}", self.name));

        match self.outcome {
            Outcome::Succeed => Ok(()),
            Outcome::Fail => anyhow::bail!("{} could not read its data", self.name),
            Outcome::Panic => panic!("{} blew up", self.name),
        }
    }
}

/// Registry with a fake client and one collector per `(name, outcome)`, all enabled
pub fn registry_with(
    client: &FakeClient,
    collectors: &[(&str, Outcome)],
) -> Arc<CollectorRegistry<FakeClient>> {
    let registry = Arc::new(CollectorRegistry::new());
    registry.register_session_client(client.clone());
    for (name, outcome) in collectors {
        let (owned, outcome) = (name.to_string(), *outcome);
        registry
            .register(name, true, move |_span| {
                Ok(Arc::new(FakeCollector::new(&owned, outcome)) as Arc<dyn Collector<FakeClient>>)
            })
            .expect("Failed to register collector");
    }
    registry
}

/// Registry with one collector per `(name, outcome, delay in ms)`, all enabled
pub fn delayed_registry(
    client: &FakeClient,
    collectors: &[(&'static str, Outcome, u64)],
) -> Arc<CollectorRegistry<FakeClient>> {
    let registry = Arc::new(CollectorRegistry::new());
    registry.register_session_client(client.clone());
    for &(name, outcome, delay) in collectors {
        registry
            .register(name, true, move |_span| {
                let collector =
                    FakeCollector::new(name, outcome).with_delay(Duration::from_millis(delay));
                Ok(Arc::new(collector) as Arc<dyn Collector<FakeClient>>)
            })
            .expect("Failed to register collector");
    }
    registry
}

/// Run one scrape and return its result together with everything it emitted
pub async fn run_scrape(set: &CollectorSet<FakeClient>) -> (Result<ScrapeSummary>, Vec<Sample>) {
    let (sink, mut receiver) = sample_channel();
    let result = set.collect(&sink).await;
    (result, receiver.drain())
}

/// Samples of one scrape series (`duration` or `success`) keyed by collector label
pub fn series<'a>(samples: &'a [Sample], fq_name: &str) -> Vec<(&'a str, f64)> {
    samples
        .iter()
        .filter(|s| s.desc().fq_name() == fq_name)
        .map(|s| (s.label("collector").unwrap_or_default(), s.value()))
        .collect()
}

pub fn value_of(series: &[(&str, f64)], collector: &str) -> Option<f64> {
    series
        .iter()
        .find(|(name, _)| *name == collector)
        .map(|(_, v)| *v)
}
