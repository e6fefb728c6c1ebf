//! Collector Registry
//!
//! Catalog of sub-collector factories and their enabled flags, plus the cache of
//! collectors that have already been instantiated. A registry is created once at
//! process start, filled by plugin registration, and then shared (via `Arc`) with
//! the HTTP layer, which asks it for a [`CollectorSet`] per scrape.
//!
//! # Instantiation
//!
//! A collector's factory runs at most once per registry: the first `build_set`
//! that needs it stores the instance, and later sets reuse it. Only `reset` or a
//! re-registration under the same name drops a cached instance.

use super::{is_reserved_name, Collector, CollectorSet, ExtraParams, SessionClient};
use crate::error::{ExporterError, Result};
use crate::metrics::is_valid_namespace;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info_span, Span};

/// Builds a sub-collector; receives a span carrying the collector's name
pub type CollectorFactory<C> =
    Box<dyn Fn(Span) -> anyhow::Result<Arc<dyn Collector<C>>> + Send + Sync>;

struct Descriptor<C: SessionClient> {
    enabled: bool,
    /// Set by the operator rather than by the plugin's default
    explicit: bool,
    factory: CollectorFactory<C>,
}

struct RegistryState<C: SessionClient> {
    descriptors: BTreeMap<String, Descriptor<C>>,
    initiated: HashMap<String, Arc<dyn Collector<C>>>,
    disable_defaults: bool,
}

pub struct CollectorRegistry<C: SessionClient> {
    client: RwLock<Option<Arc<C>>>,
    state: Mutex<RegistryState<C>>,
}

impl<C: SessionClient> Default for CollectorRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: SessionClient> CollectorRegistry<C> {
    pub fn new() -> Self {
        Self {
            client: RwLock::new(None),
            state: Mutex::new(RegistryState {
                descriptors: BTreeMap::new(),
                initiated: HashMap::new(),
                disable_defaults: false,
            }),
        }
    }

    /// Register a sub-collector factory under `name`
    ///
    /// Registering the same name again replaces the factory and drops any
    /// instance built by the previous one. An operator override for the name
    /// survives the replacement.
    pub fn register<F>(&self, name: &str, enabled_by_default: bool, factory: F) -> Result<()>
    where
        F: Fn(Span) -> anyhow::Result<Arc<dyn Collector<C>>> + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(ExporterError::Config(
                "collector name must not be empty".to_string(),
            ));
        }
        if is_reserved_name(name) {
            return Err(ExporterError::ReservedName(name.to_string()));
        }

        let mut state = self.state.lock();
        let (enabled, explicit) = match state.descriptors.get(name) {
            Some(previous) if previous.explicit => (previous.enabled, true),
            _ => (enabled_by_default, false),
        };
        state.initiated.remove(name);
        state.descriptors.insert(
            name.to_string(),
            Descriptor {
                enabled,
                explicit,
                factory: Box::new(factory),
            },
        );
        debug!(collector = name, enabled, "Registered collector");
        Ok(())
    }

    /// Install the process-wide session client used by every set built afterwards
    pub fn register_session_client(&self, client: C) {
        *self.client.write() = Some(Arc::new(client));
    }

    /// Operator override for one collector
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut state = self.state.lock();
        let descriptor = state
            .descriptors
            .get_mut(name)
            .ok_or_else(|| ExporterError::UnknownCollector(name.to_string()))?;
        descriptor.enabled = enabled;
        descriptor.explicit = true;
        Ok(())
    }

    /// Disable every collector the operator did not explicitly configure
    ///
    /// Takes effect at the next `build_set`.
    pub fn set_disable_defaults(&self, disable: bool) {
        self.state.lock().disable_defaults = disable;
    }

    /// Drop every cached collector instance
    pub fn reset(&self) {
        self.state.lock().initiated.clear();
    }

    /// Registered collector names, sorted
    pub fn names(&self) -> Vec<String> {
        self.state.lock().descriptors.keys().cloned().collect()
    }

    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.state.lock().descriptors.get(name).map(|d| d.enabled)
    }

    /// Build a scrape-ready set from the enabled collectors
    ///
    /// Construction is all-or-nothing: the first factory error is returned and no
    /// set is produced. Instances built before the failure stay cached.
    pub fn build_set(
        &self,
        namespace: &str,
        target: &str,
        extra_params: ExtraParams,
    ) -> Result<CollectorSet<C>> {
        if !is_valid_namespace(namespace) {
            return Err(ExporterError::Config(format!(
                "invalid metric namespace '{}'",
                namespace
            )));
        }

        let client = self
            .client
            .read()
            .clone()
            .ok_or(ExporterError::NoSessionClient)?;

        let mut collectors = BTreeMap::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            if state.disable_defaults {
                for descriptor in state.descriptors.values_mut() {
                    if !descriptor.explicit {
                        descriptor.enabled = false;
                    }
                }
            }

            for (name, descriptor) in &state.descriptors {
                if !descriptor.enabled {
                    debug!(collector = %name, "Collector is disabled");
                    continue;
                }
                debug!(collector = %name, "Collector is enabled");

                let collector = match state.initiated.get(name) {
                    Some(collector) => Arc::clone(collector),
                    None => {
                        let span = info_span!("collector", collector = %name);
                        let collector =
                            (descriptor.factory)(span).map_err(|e| ExporterError::Factory {
                                name: name.clone(),
                                source: e.into(),
                            })?;
                        state.initiated.insert(name.clone(), Arc::clone(&collector));
                        collector
                    }
                };
                collectors.insert(name.clone(), collector);
            }
        }

        Ok(CollectorSet::new(
            collectors,
            client,
            target,
            namespace,
            extra_params,
        ))
    }
}
