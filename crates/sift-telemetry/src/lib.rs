//! Sift Telemetry
//!
//! Counters for plugin invocations, timeouts, and dispatch failures.
//!
//! Every record is kept in-process (for snapshots and a Prometheus text
//! rendering) and also forwarded to the `metrics` facade, so an installed
//! exporter sees the same series.

pub mod metrics;

pub use metrics::{
    describe_metrics, InvocationResult, MetricSample, PluginTelemetryCollector, TelemetrySnapshot,
    UnknownResult,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::metrics::{InvocationResult, PluginTelemetryCollector};
}
