//! Backend factories
//!
//! Plugin implementations are compiled in and registered under a factory name.
//! A registry entry's `backend.factory` selects the constructor, which receives
//! the entry's resolved settings.

use crate::builtin::{KeywordHeuristicClassifier, NoopPlugin};
use crate::capability::Plugin;
use crate::config::PluginSettings;
use sift_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Constructor for one plugin implementation
pub type BackendFactory = Arc<dyn Fn(&PluginSettings) -> Result<Arc<dyn Plugin>> + Send + Sync>;

/// Factory name of the identity ingest hook
pub const NOOP_FACTORY: &str = "builtin.noop";

/// Factory name of the keyword heuristic stream classifier
pub const KEYWORD_HEURISTIC_FACTORY: &str = "builtin.keyword_heuristic_classifier";

/// Maps factory names to constructors
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the builtin plugins
    pub fn with_builtins() -> Self {
        Self::new()
            .with(NOOP_FACTORY, |_| Ok(Arc::new(NoopPlugin) as Arc<dyn Plugin>))
            .with(KEYWORD_HEURISTIC_FACTORY, |settings| {
                Ok(Arc::new(KeywordHeuristicClassifier::from_settings(settings)?) as Arc<dyn Plugin>)
            })
    }

    /// Register a factory, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&PluginSettings) -> Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&PluginSettings) -> Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered factory names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Construct the implementation for `plugin_id`
    pub fn build(
        &self,
        plugin_id: &str,
        factory: &str,
        settings: &PluginSettings,
    ) -> Result<Arc<dyn Plugin>> {
        let constructor = self.factories.get(factory.trim()).ok_or_else(|| {
            Error::plugin_load(plugin_id, format!("unknown backend factory '{}'", factory))
        })?;

        constructor(settings).map_err(|e| match e {
            e @ Error::PluginLoad { .. } => e,
            other => Error::plugin_load(plugin_id, other.to_string()),
        })
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("factories", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = BackendRegistry::with_builtins();
        assert_eq!(registry.names(), vec![KEYWORD_HEURISTIC_FACTORY, NOOP_FACTORY]);
        let plugin = registry.build("noop", NOOP_FACTORY, &PluginSettings::new()).unwrap();
        assert_eq!(plugin.name(), "noop");
    }

    #[test]
    fn test_unknown_factory_is_load_error() {
        let registry = BackendRegistry::with_builtins();
        let err = registry
            .build("mystery", "acme.classifier", &PluginSettings::new())
            .err()
            .unwrap();
        assert!(matches!(err, Error::PluginLoad { ref plugin_id, .. } if plugin_id == "mystery"));
        assert!(err.to_string().contains("unknown backend factory 'acme.classifier'"));
    }

    #[test]
    fn test_constructor_errors_become_load_errors() {
        let registry = BackendRegistry::new().with("broken", |_| Err(Error::config("missing model path")));
        let err = registry.build("p1", "broken", &PluginSettings::new()).err().unwrap();
        assert_eq!(err.kind(), "PluginLoadError");
        assert!(err.to_string().contains("missing model path"));
    }
}
