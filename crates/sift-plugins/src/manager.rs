//! Plugin loading and isolated dispatch
//!
//! Every plugin call runs as its own task under a per-capability timeout and
//! is shielded from errors and panics. A failing or slow plugin yields "no decision" for that
//! call only; it never reaches the caller and never affects other plugins.

use crate::capability::{
    Capability, ClassificationDecision, IngestHook, Plugin, StreamClassifier,
    StreamClassifierContext,
};
use crate::config::{resolve_settings, PluginEntry, PluginRegistryConfig};
use crate::factory::BackendRegistry;
use crate::runtime::{PluginRuntimeState, PluginStatusSnapshot, ValidationStatus};
use sift_core::{ArticleContext, Error, Result};
use sift_telemetry::{InvocationResult, PluginTelemetryCollector};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Per-capability invocation deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTimeouts {
    pub ingest_hook: Duration,
    pub stream_classifier: Duration,
    /// Used for capabilities without their own deadline
    pub default: Duration,
}

impl Default for DispatchTimeouts {
    fn default() -> Self {
        Self {
            ingest_hook: Duration::from_millis(2_000),
            stream_classifier: Duration::from_millis(5_000),
            default: Duration::from_millis(5_000),
        }
    }
}

impl DispatchTimeouts {
    pub fn for_capability(&self, capability: Capability) -> Duration {
        match capability {
            Capability::IngestHook => self.ingest_hook,
            Capability::StreamClassifier => self.stream_classifier,
            _ => self.default,
        }
    }
}

/// How a single dispatch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStatus {
    Success,
    /// The plugin returned an error or panicked
    Failure(String),
    Timeout { timeout_ms: u64 },
    /// No loaded plugin could serve the call
    Unavailable(String),
}

impl DispatchStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Message for audit records, `None` on success
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Success => None,
            Self::Failure(message) | Self::Unavailable(message) => Some(message.clone()),
            Self::Timeout { timeout_ms } => Some(format!("timed out after {}ms", timeout_ms)),
        }
    }
}

/// Result of one dispatch, with timing for audit records
#[derive(Debug, Clone)]
pub struct DispatchOutcome<T> {
    /// `None` unless the plugin returned a value in time
    pub value: Option<T>,
    pub status: DispatchStatus,
    pub duration: Duration,
}

impl<T> DispatchOutcome<T> {
    fn unavailable(reason: String) -> Self {
        Self {
            value: None,
            status: DispatchStatus::Unavailable(reason),
            duration: Duration::ZERO,
        }
    }
}

struct LoadedPlugin {
    id: String,
    state: Arc<PluginRuntimeState>,
    ingest_hook: Option<Arc<dyn IngestHook>>,
    stream_classifier: Option<Arc<dyn StreamClassifier>>,
}

/// Loaded plugin set and dispatcher
///
/// Built once at startup and shared read-only; only the runtime counters
/// change afterwards.
pub struct PluginManager {
    plugins: Vec<LoadedPlugin>,
    states: Vec<Arc<PluginRuntimeState>>,
    timeouts: DispatchTimeouts,
    telemetry: PluginTelemetryCollector,
}

impl PluginManager {
    /// A manager with no plugins
    pub fn empty(timeouts: DispatchTimeouts, telemetry: PluginTelemetryCollector) -> Self {
        Self {
            plugins: Vec::new(),
            states: Vec::new(),
            timeouts,
            telemetry,
        }
    }

    /// Construct and validate every declared plugin
    ///
    /// Failures are recorded per plugin and never abort the load.
    pub fn load_from_registry(
        registry: &PluginRegistryConfig,
        backends: &BackendRegistry,
        timeouts: DispatchTimeouts,
        telemetry: PluginTelemetryCollector,
    ) -> Self {
        Self::load_with_env(registry, backends, timeouts, telemetry, |name| {
            std::env::var(name).ok()
        })
    }

    /// Like [`load_from_registry`](Self::load_from_registry) with a custom
    /// environment lookup for `${VAR}` settings
    pub fn load_with_env<F>(
        registry: &PluginRegistryConfig,
        backends: &BackendRegistry,
        timeouts: DispatchTimeouts,
        telemetry: PluginTelemetryCollector,
        lookup: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String> + Copy,
    {
        let mut manager = Self::empty(timeouts, telemetry);

        for entry in &registry.plugins {
            let state = Arc::new(PluginRuntimeState::new(
                entry.id.clone(),
                entry.enabled,
                entry.capabilities.clone(),
            ));
            manager.states.push(Arc::clone(&state));

            if !entry.enabled {
                state.mark_unavailable(ValidationStatus::Disabled, "disabled in registry");
                debug!(plugin_id = %entry.id, "Plugin disabled");
                continue;
            }

            match load_plugin(entry, backends, lookup) {
                Ok(plugin) => match bind_capabilities(entry, plugin) {
                    Ok((ingest_hook, stream_classifier)) => {
                        state.mark_ok();
                        manager.plugins.push(LoadedPlugin {
                            id: entry.id.clone(),
                            state,
                            ingest_hook,
                            stream_classifier,
                        });
                    }
                    Err(e) => {
                        warn!(
                            plugin_id = %entry.id,
                            capability = "startup",
                            error_type = e.kind(),
                            error = %e,
                            "Plugin capability contract not satisfied"
                        );
                        state.mark_unavailable(ValidationStatus::InvalidCapabilityImpl, e.to_string());
                    }
                },
                Err(e) => {
                    warn!(
                        plugin_id = %entry.id,
                        capability = "startup",
                        error_type = e.kind(),
                        error = %e,
                        "Failed to load plugin"
                    );
                    state.mark_unavailable(ValidationStatus::LoadError, e.to_string());
                }
            }
        }

        info!(
            "Plugin registry loaded: {}/{} plugins active",
            manager.plugins.len(),
            manager.states.len()
        );

        manager
    }

    /// Ids of the plugins that passed validation, in registry order
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|plugin| plugin.id.as_str()).collect()
    }

    pub fn telemetry(&self) -> &PluginTelemetryCollector {
        &self.telemetry
    }

    pub fn timeouts(&self) -> DispatchTimeouts {
        self.timeouts
    }

    /// Diagnostics for every declared plugin, loaded or not
    pub fn status_snapshots(&self) -> Vec<PluginStatusSnapshot> {
        self.states.iter().map(|state| state.snapshot()).collect()
    }

    pub fn status(&self, plugin_id: &str) -> Option<PluginStatusSnapshot> {
        self.states
            .iter()
            .find(|state| state.plugin_id() == plugin_id)
            .map(|state| state.snapshot())
    }

    /// Pass the article through every ingest hook in registry order
    ///
    /// A hook that fails or times out is skipped; the article it received is
    /// handed on unchanged.
    pub async fn run_ingest_hooks(&self, article: ArticleContext) -> ArticleContext {
        let mut current = article;
        for plugin in &self.plugins {
            let Some(hook) = &plugin.ingest_hook else {
                continue;
            };
            let hook = Arc::clone(hook);
            let input = current.clone();
            let outcome = self
                .invoke(plugin, Capability::IngestHook, async move {
                    hook.on_article_ingested(input).await
                })
                .await;
            if let Some(next) = outcome.value {
                current = next;
            }
        }
        current
    }

    /// Ask one plugin to classify an article for a stream
    pub async fn classify_stream(
        &self,
        plugin_id: &str,
        article: &ArticleContext,
        stream: &StreamClassifierContext,
    ) -> Option<ClassificationDecision> {
        self.classify_stream_detailed(plugin_id, article, stream)
            .await
            .value
    }

    /// [`classify_stream`](Self::classify_stream) with status and timing
    pub async fn classify_stream_detailed(
        &self,
        plugin_id: &str,
        article: &ArticleContext,
        stream: &StreamClassifierContext,
    ) -> DispatchOutcome<ClassificationDecision> {
        let capability = Capability::StreamClassifier;

        let plugin = match self.plugins.iter().find(|plugin| plugin.id == plugin_id) {
            Some(plugin) => plugin,
            None => {
                let reason = match self.states.iter().find(|s| s.plugin_id() == plugin_id) {
                    Some(state) => format!("plugin '{}' is not loaded ({})", plugin_id, state.status()),
                    None => format!("plugin '{}' is not registered", plugin_id),
                };
                return self.dispatch_failure(plugin_id, capability, reason);
            }
        };

        let Some(classifier) = &plugin.stream_classifier else {
            let reason = format!("plugin '{}' does not declare {}", plugin_id, capability);
            return self.dispatch_failure(plugin_id, capability, reason);
        };

        let classifier = Arc::clone(classifier);
        let article = article.clone();
        let stream = stream.clone();
        let outcome = self
            .invoke(plugin, capability, async move {
                classifier.classify_stream(&article, &stream).await
            })
            .await;

        DispatchOutcome {
            value: outcome.value.flatten(),
            status: outcome.status,
            duration: outcome.duration,
        }
    }

    fn dispatch_failure<T>(
        &self,
        plugin_id: &str,
        capability: Capability,
        reason: String,
    ) -> DispatchOutcome<T> {
        self.telemetry.record_dispatch_failure(capability.as_str());
        warn!(
            plugin_id = %plugin_id,
            capability = %capability,
            result = "failure",
            "Plugin dispatch failed: {}",
            reason
        );
        DispatchOutcome::unavailable(reason)
    }

    /// Run one plugin call under its deadline with error and panic isolation
    ///
    /// The call is spawned so a plugin that blocks its worker thread still
    /// hits the deadline; the task is aborted once the deadline passes.
    async fn invoke<T, Fut>(
        &self,
        plugin: &LoadedPlugin,
        capability: Capability,
        call: Fut,
    ) -> DispatchOutcome<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let timeout = self.timeouts.for_capability(capability);
        let started = Instant::now();
        let mut handle = tokio::spawn(call);
        let result = tokio::time::timeout(timeout, &mut handle).await;
        if result.is_err() {
            handle.abort();
        }
        let duration = started.elapsed();
        let duration_ms = duration.as_millis() as u64;

        let (value, status, error) = match result {
            Ok(Ok(Ok(value))) => (Some(value), DispatchStatus::Success, None),
            Ok(Ok(Err(e))) => {
                let e = match e {
                    e @ Error::PluginInvocation { .. } => e,
                    other => Error::plugin_invocation(&plugin.id, capability.as_str(), other.to_string()),
                };
                warn!(
                    plugin_id = %plugin.id,
                    capability = %capability,
                    result = "failure",
                    duration_ms,
                    error_type = e.kind(),
                    error = %e,
                    "Plugin invocation failed"
                );
                (None, DispatchStatus::Failure(e.to_string()), Some(e))
            }
            Ok(Err(join_error)) => {
                let message = if join_error.is_panic() {
                    format!("panicked: {}", panic_message(join_error.into_panic().as_ref()))
                } else {
                    "task was cancelled".to_string()
                };
                let e = Error::plugin_invocation(&plugin.id, capability.as_str(), message);
                warn!(
                    plugin_id = %plugin.id,
                    capability = %capability,
                    result = "failure",
                    duration_ms,
                    error_type = "Panic",
                    error = %e,
                    "Plugin invocation panicked"
                );
                (None, DispatchStatus::Failure(e.to_string()), Some(e))
            }
            Err(_) => {
                let e = Error::PluginTimeout {
                    plugin_id: plugin.id.clone(),
                    capability: capability.as_str().to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                };
                warn!(
                    plugin_id = %plugin.id,
                    capability = %capability,
                    result = "timeout",
                    duration_ms,
                    error_type = e.kind(),
                    "Plugin invocation timed out"
                );
                self.telemetry.record_timeout(&plugin.id, capability.as_str());
                let status = DispatchStatus::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                };
                (None, status, Some(e))
            }
        };

        let result = match status {
            DispatchStatus::Success => InvocationResult::Success,
            DispatchStatus::Timeout { .. } => InvocationResult::Timeout,
            _ => InvocationResult::Failure,
        };
        if result == InvocationResult::Success {
            debug!(
                plugin_id = %plugin.id,
                capability = %capability,
                result = "success",
                duration_ms,
                "Plugin invocation succeeded"
            );
        }

        plugin.state.record(capability, result, error.map(|e| e.to_string()));
        self.telemetry
            .record_invocation(&plugin.id, capability.as_str(), result, duration);

        DispatchOutcome {
            value,
            status,
            duration,
        }
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.names())
            .field("declared", &self.states.len())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

fn load_plugin<F>(entry: &PluginEntry, backends: &BackendRegistry, lookup: F) -> Result<Arc<dyn Plugin>>
where
    F: Fn(&str) -> Option<String> + Copy,
{
    let settings =
        resolve_settings(&entry.settings, lookup).map_err(|e| Error::plugin_load(&entry.id, e))?;
    backends.build(&entry.id, &entry.backend.factory, &settings)
}

type BoundCapabilities = (Option<Arc<dyn IngestHook>>, Option<Arc<dyn StreamClassifier>>);

/// Resolve the trait object behind every declared capability with a dispatch contract
fn bind_capabilities(entry: &PluginEntry, plugin: Arc<dyn Plugin>) -> Result<BoundCapabilities> {
    let mut ingest_hook = None;
    let mut stream_classifier = None;

    for capability in &entry.capabilities {
        let Some(method) = capability.required_method() else {
            continue;
        };
        let bound = match capability {
            Capability::IngestHook => {
                ingest_hook = Arc::clone(&plugin).as_ingest_hook();
                ingest_hook.is_some()
            }
            Capability::StreamClassifier => {
                stream_classifier = Arc::clone(&plugin).as_stream_classifier();
                stream_classifier.is_some()
            }
            _ => true,
        };
        if !bound {
            return Err(Error::CapabilityContract {
                plugin_id: entry.id.clone(),
                capability: capability.as_str().to_string(),
                message: format!("implementation '{}' does not provide {}", plugin.name(), method),
            });
        }
    }

    Ok((ingest_hook, stream_classifier))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
