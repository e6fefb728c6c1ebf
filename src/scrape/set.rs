//! Collector Set - scrape orchestration
//!
//! A [`CollectorSet`] runs one scrape:
//! 1. Log in to the target (failure ends the scrape with no samples)
//! 2. Emit the `login` duration
//! 3. Spawn one task per sub-collector, each emitting its own duration and success
//! 4. Wait for every task
//! 5. Log out (failure is logged only)
//!
//! If the scrape future is dropped midway, the sub-collector tasks are aborted
//! and the session is still logged out in the background.
//! 6. Emit the `logout` and `all_collectors` durations
//!
//! The only ordering guaranteed is login before any update and every update
//! before logout. There is no internal timeout: a hung sub-collector holds up
//! the whole scrape, so callers that need a deadline must enforce it outside.

use super::{Collector, ExtraParams, Session, SessionClient, ALL_COLLECTORS, LOGIN, LOGOUT};
use crate::error::{ExporterError, Result};
use crate::metrics::{MetricDesc, MetricSink, ScrapeMetrics};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info_span, warn, Instrument};

/// Outcome of a scrape whose login succeeded
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeSummary {
    /// Target reported by the session, which may differ from the requested one
    pub target: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub logout_ok: bool,
    pub duration: Duration,
}

impl ScrapeSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.logout_ok
    }
}

pub struct CollectorSet<C: SessionClient> {
    collectors: BTreeMap<String, Arc<dyn Collector<C>>>,
    client: Arc<C>,
    target: String,
    namespace: Arc<str>,
    extra_params: Arc<ExtraParams>,
    scrape_metrics: ScrapeMetrics,
}

impl<C: SessionClient> CollectorSet<C> {
    pub(super) fn new(
        collectors: BTreeMap<String, Arc<dyn Collector<C>>>,
        client: Arc<C>,
        target: &str,
        namespace: &str,
        extra_params: ExtraParams,
    ) -> Self {
        Self {
            collectors,
            client,
            target: target.to_string(),
            namespace: Arc::from(namespace),
            extra_params: Arc::new(extra_params),
            scrape_metrics: ScrapeMetrics::new(namespace),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn collector_names(&self) -> Vec<&str> {
        self.collectors.keys().map(String::as_str).collect()
    }

    pub fn scrape_metrics(&self) -> &ScrapeMetrics {
        &self.scrape_metrics
    }

    /// Descriptors this set always produces, available before any scrape
    pub fn describe(&self) -> [&MetricDesc; 2] {
        [&self.scrape_metrics.duration, &self.scrape_metrics.success]
    }

    /// Run one scrape, sending every sample to `sink`
    ///
    /// Returns an error only when login fails; sub-collector and logout failures
    /// are reported in the summary and through the success series.
    pub async fn collect(&self, sink: &MetricSink) -> Result<ScrapeSummary> {
        let span = info_span!("scrape", namespace = %self.namespace, target = %self.target);
        self.run(sink).instrument(span).await
    }

    async fn run(&self, sink: &MetricSink) -> Result<ScrapeSummary> {
        let begin = Instant::now();

        let session = match self.client.login(&self.target).await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                error!(target = %self.target, error = %e, "Login failed");
                return Err(ExporterError::Login {
                    target: self.target.clone(),
                    source: Box::new(e),
                });
            }
        };
        let reached = session.target().to_string();
        debug!(target = %reached, "Login successful");

        // Not a collector, but it makes the overall timing easier to read
        emit(sink, &self.scrape_metrics.duration, LOGIN, begin.elapsed().as_secs_f64());

        debug!(count = self.collectors.len(), "Number of collectors to scrape");

        let mut fan_out = FanOut::new(Arc::clone(&self.client), Arc::clone(&session));
        let fan_out_begin = Instant::now();

        for (name, collector) in &self.collectors {
            let task_name = name.clone();
            let collector = Arc::clone(collector);
            let client = Arc::clone(&self.client);
            let session = Arc::clone(&session);
            let namespace = Arc::clone(&self.namespace);
            let params = Arc::clone(&self.extra_params);
            let metrics = self.scrape_metrics.clone();
            let sink = sink.clone();

            let handle = fan_out.tasks.spawn(
                async move {
                    let begin = Instant::now();
                    let result = collector
                        .update(&sink, &namespace, &client, &session, &params)
                        .await;
                    let duration = begin.elapsed().as_secs_f64();

                    let ok = match result {
                        Ok(()) => {
                            debug!(
                                target = session.target(),
                                collector = %task_name,
                                duration_seconds = duration,
                                "Collector scraped successfully"
                            );
                            true
                        }
                        Err(e) => {
                            error!(
                                collector = %task_name,
                                duration_seconds = duration,
                                error = %e,
                                "Collector failed"
                            );
                            false
                        }
                    };

                    emit(&sink, &metrics.duration, &task_name, duration);
                    emit(&sink, &metrics.success, &task_name, if ok { 1.0 } else { 0.0 });
                    (task_name, ok)
                }
                .in_current_span(),
            );
            fan_out.names.insert(handle.id(), name.clone());
        }
        drop(session);

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        while let Some(joined) = fan_out.tasks.join_next().await {
            match joined {
                Ok((name, true)) => succeeded.push(name),
                Ok((name, false)) => failed.push(name),
                Err(e) => {
                    // The task died before it could report for itself
                    let name = fan_out.names.remove(&e.id()).unwrap_or_default();
                    error!(collector = %name, error = %e, "Collector task panicked");
                    emit(sink, &self.scrape_metrics.duration, &name, fan_out_begin.elapsed().as_secs_f64());
                    emit(sink, &self.scrape_metrics.success, &name, 0.0);
                    failed.push(name);
                }
            }
        }
        succeeded.sort();
        failed.sort();

        let logout_begin = Instant::now();
        let logout_ok = match fan_out.finish() {
            Some(session) => match self.client.logout(&session).await {
                Ok(()) => {
                    debug!(target = %reached, "Logout successful");
                    true
                }
                Err(e) => {
                    error!(target = %reached, error = %e, "Logout failed");
                    false
                }
            },
            None => false,
        };

        emit(sink, &self.scrape_metrics.duration, LOGOUT, logout_begin.elapsed().as_secs_f64());

        let duration = begin.elapsed();
        emit(sink, &self.scrape_metrics.duration, ALL_COLLECTORS, duration.as_secs_f64());

        Ok(ScrapeSummary {
            target: reached,
            succeeded,
            failed,
            logout_ok,
            duration,
        })
    }
}

/// Sub-collector tasks of one scrape, together with the session they share
///
/// If the scrape is dropped before [`FanOut::finish`], the tasks are aborted
/// and the session is logged out in the background once they have stopped.
struct FanOut<C: SessionClient> {
    tasks: JoinSet<(String, bool)>,
    names: HashMap<task::Id, String>,
    client: Arc<C>,
    session: Option<Arc<C::Session>>,
}

impl<C: SessionClient> FanOut<C> {
    fn new(client: Arc<C>, session: Arc<C::Session>) -> Self {
        Self {
            tasks: JoinSet::new(),
            names: HashMap::new(),
            client,
            session: Some(session),
        }
    }

    /// Hand the session back for logout once every task has been joined
    fn finish(&mut self) -> Option<Arc<C::Session>> {
        self.session.take()
    }
}

impl<C: SessionClient> Drop for FanOut<C> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!(target = session.target(), "Scrape cancelled outside a runtime, session not logged out");
            return;
        };

        warn!(target = session.target(), "Scrape cancelled, aborting collectors");
        self.tasks.abort_all();
        let mut tasks = std::mem::take(&mut self.tasks);
        let client = Arc::clone(&self.client);

        runtime.spawn(
            async move {
                while tasks.join_next().await.is_some() {}
                match client.logout(&session).await {
                    Ok(()) => debug!(target = session.target(), "Logout after cancelled scrape"),
                    Err(e) => error!(target = session.target(), error = %e, "Logout failed"),
                }
            }
            .in_current_span(),
        );
    }
}

fn emit(sink: &MetricSink, desc: &MetricDesc, collector: &str, value: f64) {
    if let Err(e) = sink.emit(desc, &[collector], value) {
        warn!(collector, error = %e, "Failed to emit scrape sample");
    }
}
