//! Sift Plugins
//!
//! Capability-based extension layer:
//! - A declarative registry document listing plugins, their backend factory,
//!   and the capabilities they claim
//! - Compile-time backend factories in place of dynamic class loading
//! - Contract validation that binds each declared capability to its trait
//! - A dispatcher that isolates every invocation behind a timeout, error
//!   capture, and panic capture, and records telemetry for each call

pub mod builtin;
pub mod capability;
pub mod config;
pub mod factory;
pub mod manager;
pub mod runtime;

pub use capability::{
    Capability, ClassificationDecision, Finding, IngestHook, Plugin, StreamClassifier,
    StreamClassifierContext,
};
pub use config::{load_registry_file, BackendSpec, PluginEntry, PluginRegistryConfig, PluginSettings};
pub use factory::{BackendFactory, BackendRegistry, KEYWORD_HEURISTIC_FACTORY, NOOP_FACTORY};
pub use manager::{DispatchOutcome, DispatchStatus, DispatchTimeouts, PluginManager};
pub use runtime::{CounterSnapshot, PluginRuntimeState, PluginStatusSnapshot, ValidationStatus};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::capability::{ClassificationDecision, IngestHook, Plugin, StreamClassifier, StreamClassifierContext};
    pub use crate::factory::BackendRegistry;
    pub use crate::manager::{DispatchTimeouts, PluginManager};
}
