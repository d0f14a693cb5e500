//! Per-plugin runtime state and diagnostics snapshots

use crate::capability::Capability;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sift_telemetry::InvocationResult;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of validating a plugin at registry load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Ok,
    Disabled,
    LoadError,
    InvalidCapabilityImpl,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ok => "ok",
            Self::Disabled => "disabled",
            Self::LoadError => "load_error",
            Self::InvalidCapabilityImpl => "invalid_capability_impl",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct CapabilityCounters {
    success: AtomicU64,
    failure: AtomicU64,
    timeout: AtomicU64,
}

/// Point-in-time invocation counts for one capability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub success_count: u64,
    pub failure_count: u64,
    pub timeout_count: u64,
}

#[derive(Debug)]
struct Diagnostics {
    status: ValidationStatus,
    unavailable_reason: Option<String>,
    last_error: Option<String>,
    last_updated_at: DateTime<Utc>,
}

/// Live state of one declared plugin
///
/// Counters are updated concurrently by the dispatcher; everything else is
/// guarded by a short-lived lock.
#[derive(Debug)]
pub struct PluginRuntimeState {
    plugin_id: String,
    enabled: bool,
    capabilities: Vec<Capability>,
    counters: BTreeMap<Capability, CapabilityCounters>,
    diagnostics: Mutex<Diagnostics>,
}

impl PluginRuntimeState {
    pub fn new(plugin_id: impl Into<String>, enabled: bool, capabilities: Vec<Capability>) -> Self {
        let counters = capabilities
            .iter()
            .map(|capability| (*capability, CapabilityCounters::default()))
            .collect();
        Self {
            plugin_id: plugin_id.into(),
            enabled,
            capabilities,
            counters,
            diagnostics: Mutex::new(Diagnostics {
                status: ValidationStatus::Pending,
                unavailable_reason: None,
                last_error: None,
                last_updated_at: Utc::now(),
            }),
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn status(&self) -> ValidationStatus {
        self.diagnostics.lock().status
    }

    /// Loaded plugins are the only ones ever dispatched to
    pub fn loaded(&self) -> bool {
        self.status() == ValidationStatus::Ok
    }

    pub(crate) fn mark_ok(&self) {
        let mut diagnostics = self.diagnostics.lock();
        diagnostics.status = ValidationStatus::Ok;
        diagnostics.unavailable_reason = None;
        diagnostics.last_updated_at = Utc::now();
    }

    /// Record why the plugin will not be dispatched to
    pub(crate) fn mark_unavailable(&self, status: ValidationStatus, reason: impl Into<String>) {
        let reason = reason.into();
        let mut diagnostics = self.diagnostics.lock();
        diagnostics.status = status;
        if status != ValidationStatus::Disabled {
            diagnostics.last_error = Some(reason.clone());
        }
        diagnostics.unavailable_reason = Some(reason);
        diagnostics.last_updated_at = Utc::now();
    }

    /// Count one invocation outcome
    pub(crate) fn record(&self, capability: Capability, result: InvocationResult, error: Option<String>) {
        if let Some(counters) = self.counters.get(&capability) {
            let counter = match result {
                InvocationResult::Success => &counters.success,
                InvocationResult::Failure => &counters.failure,
                InvocationResult::Timeout => &counters.timeout,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }

        let mut diagnostics = self.diagnostics.lock();
        if error.is_some() {
            diagnostics.last_error = error;
        }
        diagnostics.last_updated_at = Utc::now();
    }

    pub fn counters(&self, capability: Capability) -> CounterSnapshot {
        self.counters
            .get(&capability)
            .map(|counters| CounterSnapshot {
                success_count: counters.success.load(Ordering::Relaxed),
                failure_count: counters.failure.load(Ordering::Relaxed),
                timeout_count: counters.timeout.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> PluginStatusSnapshot {
        let counters = self
            .capabilities
            .iter()
            .map(|capability| (*capability, self.counters(*capability)))
            .collect();
        let diagnostics = self.diagnostics.lock();

        PluginStatusSnapshot {
            plugin_id: self.plugin_id.clone(),
            enabled: self.enabled,
            loaded: diagnostics.status == ValidationStatus::Ok,
            capabilities: self.capabilities.clone(),
            startup_validation_status: diagnostics.status,
            unavailable_reason: diagnostics.unavailable_reason.clone(),
            last_error: diagnostics.last_error.clone(),
            counters,
            last_updated_at: diagnostics.last_updated_at,
        }
    }
}

/// Read-only copy of a plugin's state for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginStatusSnapshot {
    pub plugin_id: String,
    pub enabled: bool,
    pub loaded: bool,
    pub capabilities: Vec<Capability>,
    pub startup_validation_status: ValidationStatus,
    pub unavailable_reason: Option<String>,
    pub last_error: Option<String>,
    pub counters: BTreeMap<Capability, CounterSnapshot>,
    pub last_updated_at: DateTime<Utc>,
}
