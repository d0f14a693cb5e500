//! Plugin invocation metrics

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const INVOCATIONS_TOTAL: &str = "sift_plugin_invocations_total";
pub const INVOCATION_DURATION_SECONDS: &str = "sift_plugin_invocation_duration_seconds";
pub const TIMEOUTS_TOTAL: &str = "sift_plugin_timeouts_total";
pub const DISPATCH_FAILURES_TOTAL: &str = "sift_plugin_dispatch_failures_total";

const METRICS: [(&str, &str); 4] = [
    (
        INVOCATIONS_TOTAL,
        "Total plugin invocations by plugin, capability, and result.",
    ),
    (
        INVOCATION_DURATION_SECONDS,
        "Total plugin invocation duration in seconds by result.",
    ),
    (
        TIMEOUTS_TOTAL,
        "Total plugin timeouts by plugin and capability.",
    ),
    (
        DISPATCH_FAILURES_TOTAL,
        "Total plugin dispatch failures by capability.",
    ),
];

/// Register metric descriptions with the installed `metrics` recorder
pub fn describe_metrics() {
    ::metrics::describe_counter!(INVOCATIONS_TOTAL, METRICS[0].1);
    ::metrics::describe_histogram!(
        INVOCATION_DURATION_SECONDS,
        ::metrics::Unit::Seconds,
        METRICS[1].1
    );
    ::metrics::describe_counter!(TIMEOUTS_TOTAL, METRICS[2].1);
    ::metrics::describe_counter!(DISPATCH_FAILURES_TOTAL, METRICS[3].1);
}

/// Outcome label of one plugin invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationResult {
    Success,
    Failure,
    Timeout,
}

impl InvocationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for InvocationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result label outside `success|failure|timeout`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported plugin telemetry result '{0}'")]
pub struct UnknownResult(pub String);

impl FromStr for InvocationResult {
    type Err = UnknownResult;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "timeout" => Ok(Self::Timeout),
            _ => Err(UnknownResult(value.to_string())),
        }
    }
}

/// One labelled series value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub labels: BTreeMap<&'static str, String>,
    pub value: f64,
}

/// Point-in-time copy of every series, keyed by metric name
pub type TelemetrySnapshot = BTreeMap<&'static str, Vec<MetricSample>>;

type InvocationKey = (String, String, InvocationResult);

#[derive(Default)]
struct TelemetryInner {
    invocations: BTreeMap<InvocationKey, u64>,
    durations: BTreeMap<InvocationKey, f64>,
    timeouts: BTreeMap<(String, String), u64>,
    dispatch_failures: BTreeMap<String, u64>,
}

/// Thread-safe collector for plugin telemetry
#[derive(Clone, Default)]
pub struct PluginTelemetryCollector {
    inner: Arc<Mutex<TelemetryInner>>,
}

impl PluginTelemetryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed invocation
    pub fn record_invocation(
        &self,
        plugin_id: &str,
        capability: &str,
        result: InvocationResult,
        duration: Duration,
    ) {
        let seconds = duration.as_secs_f64();
        {
            let mut inner = self.inner.lock();
            let key = (plugin_id.to_string(), capability.to_string(), result);
            *inner.invocations.entry(key.clone()).or_default() += 1;
            *inner.durations.entry(key).or_default() += seconds;
        }

        ::metrics::counter!(
            INVOCATIONS_TOTAL,
            "plugin_id" => plugin_id.to_string(),
            "capability" => capability.to_string(),
            "result" => result.as_str()
        )
        .increment(1);
        ::metrics::histogram!(
            INVOCATION_DURATION_SECONDS,
            "plugin_id" => plugin_id.to_string(),
            "capability" => capability.to_string(),
            "result" => result.as_str()
        )
        .record(seconds);
    }

    pub fn record_timeout(&self, plugin_id: &str, capability: &str) {
        {
            let mut inner = self.inner.lock();
            *inner
                .timeouts
                .entry((plugin_id.to_string(), capability.to_string()))
                .or_default() += 1;
        }

        ::metrics::counter!(
            TIMEOUTS_TOTAL,
            "plugin_id" => plugin_id.to_string(),
            "capability" => capability.to_string()
        )
        .increment(1);
    }

    /// Record a call that never reached a plugin
    pub fn record_dispatch_failure(&self, capability: &str) {
        {
            let mut inner = self.inner.lock();
            *inner
                .dispatch_failures
                .entry(capability.to_string())
                .or_default() += 1;
        }

        ::metrics::counter!(DISPATCH_FAILURES_TOTAL, "capability" => capability.to_string())
            .increment(1);
    }

    /// Copy every series, sorted by labels
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let inner = self.inner.lock();
        let mut snapshot = TelemetrySnapshot::new();

        snapshot.insert(
            INVOCATIONS_TOTAL,
            inner
                .invocations
                .iter()
                .map(|(key, count)| invocation_sample(key, *count as f64))
                .collect(),
        );
        snapshot.insert(
            INVOCATION_DURATION_SECONDS,
            inner
                .durations
                .iter()
                .map(|(key, seconds)| invocation_sample(key, *seconds))
                .collect(),
        );
        snapshot.insert(
            TIMEOUTS_TOTAL,
            inner
                .timeouts
                .iter()
                .map(|((plugin_id, capability), count)| MetricSample {
                    labels: BTreeMap::from([
                        ("plugin_id", plugin_id.clone()),
                        ("capability", capability.clone()),
                    ]),
                    value: *count as f64,
                })
                .collect(),
        );
        snapshot.insert(
            DISPATCH_FAILURES_TOTAL,
            inner
                .dispatch_failures
                .iter()
                .map(|(capability, count)| MetricSample {
                    labels: BTreeMap::from([("capability", capability.clone())]),
                    value: *count as f64,
                })
                .collect(),
        );

        snapshot
    }

    /// Render the Prometheus text exposition format
    pub fn render_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        for (name, help) in METRICS {
            out.push_str(&format!("# HELP {} {}\n", name, help));
            out.push_str(&format!("# TYPE {} counter\n", name));
            for sample in snapshot.get(name).into_iter().flatten() {
                let labels = sample
                    .labels
                    .iter()
                    .map(|(key, value)| format!("{}=\"{}\"", key, escape_label(value)))
                    .collect::<Vec<_>>()
                    .join(",");
                out.push_str(&format!("{}{{{}}} {}\n", name, labels, sample.value));
            }
        }

        out
    }
}

fn invocation_sample((plugin_id, capability, result): &InvocationKey, value: f64) -> MetricSample {
    MetricSample {
        labels: BTreeMap::from([
            ("plugin_id", plugin_id.clone()),
            ("capability", capability.clone()),
            ("result", result.as_str().to_string()),
        ]),
        value,
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
