//! Plugin registry document
//!
//! ```yaml
//! version: 1
//! plugins:
//!   - id: keyword_classifier
//!     backend:
//!       factory: builtin.keyword_heuristic_classifier
//!     capabilities: [stream_classifier]
//!     settings:
//!       fallback_confidence: 0.55
//!       api_token: ${KEYWORD_API_TOKEN}
//! ```

use crate::capability::Capability;
use serde::{Deserialize, Serialize};
use sift_core::{Error, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::error;

/// Opaque per-plugin settings
pub type PluginSettings = BTreeMap<String, serde_json::Value>;

const MAX_ID_LEN: usize = 128;
const MAX_UI_TEXT_LEN: usize = 120;
const MAX_UI_ORDER: u32 = 10_000;

/// Key fragments that mark a setting as sensitive
const SENSITIVE_MARKERS: [&str; 6] = ["secret", "token", "password", "apikey", "accesskey", "privatekey"];

/// Root of the plugin registry file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginRegistryConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

fn default_version() -> u32 {
    1
}

impl Default for PluginRegistryConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            plugins: Vec::new(),
        }
    }
}

/// One plugin declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginEntry {
    pub id: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub backend: BackendSpec,

    #[serde(default)]
    pub capabilities: Vec<Capability>,

    #[serde(default)]
    pub ui: Option<PluginUiConfig>,

    #[serde(default)]
    pub settings: PluginSettings,
}

fn default_true() -> bool {
    true
}

impl PluginEntry {
    pub fn new(id: impl Into<String>, factory: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            backend: BackendSpec {
                factory: factory.into(),
            },
            capabilities: Vec::new(),
            ui: None,
            settings: PluginSettings::new(),
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// How to construct the plugin implementation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSpec {
    /// Name registered in the [`BackendRegistry`](crate::BackendRegistry)
    pub factory: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginUiConfig {
    #[serde(default)]
    pub area: Option<PluginUiArea>,
}

/// Navigation area contributed by a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginUiArea {
    pub title: String,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default = "default_order")]
    pub order: u32,

    #[serde(default)]
    pub route_key: Option<String>,
}

fn default_order() -> u32 {
    100
}

impl PluginRegistryConfig {
    /// Parse and validate a registry document
    ///
    /// An empty document is an empty registry.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml)
            .map_err(|e| Error::registry(format!("invalid YAML in plugin registry: {}", e)))?;
        Self::from_value(raw)
    }

    fn from_value(raw: serde_yaml::Value) -> Result<Self> {
        let raw = match raw {
            serde_yaml::Value::Null => return Ok(Self::default()),
            value @ serde_yaml::Value::Mapping(_) => value,
            _ => return Err(Error::registry("plugin registry root must be a mapping")),
        };

        let mut config: Self = serde_yaml::from_value(raw)
            .map_err(|e| Error::registry(format!("plugin registry validation failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the whole document, normalizing capability lists in place
    pub fn validate(&mut self) -> Result<()> {
        if self.version < 1 {
            return Err(Error::registry("version must be at least 1"));
        }

        let mut seen = HashSet::new();
        for (index, entry) in self.plugins.iter_mut().enumerate() {
            let at = |msg: String| Error::registry(format!("plugins.{}: {}", index, msg));

            validate_id(&entry.id).map_err(at)?;
            if !seen.insert(entry.id.clone()) {
                return Err(Error::registry(format!("Duplicate plugin id '{}'", entry.id)));
            }

            if entry.backend.factory.trim().is_empty() {
                return Err(at("backend.factory cannot be empty".to_string()));
            }

            let mut unique = HashSet::new();
            entry.capabilities.retain(|capability| unique.insert(*capability));

            if let Some(area) = entry.ui.as_ref().and_then(|ui| ui.area.as_ref()) {
                validate_area(area).map_err(at)?;
            }

            check_sensitive_settings(&entry.settings, "settings").map_err(at)?;
        }

        Ok(())
    }

    /// Plugins with `enabled: true`
    pub fn enabled_plugins(&self) -> impl Iterator<Item = &PluginEntry> {
        self.plugins.iter().filter(|entry| entry.enabled)
    }
}

/// Read, parse, and validate a registry file
///
/// Every failure is fatal for the whole registry.
pub fn load_registry_file(path: impl AsRef<Path>) -> Result<PluginRegistryConfig> {
    let path = path.as_ref();

    let result = read_registry(path);
    if let Err(e) = &result {
        error!(
            event = "plugin.registry.validation_error",
            capability = "startup",
            result = "failure",
            duration_ms = 0u64,
            error_type = e.kind(),
            path = %path.display(),
            error = %e,
            "plugin.registry.validation_error"
        );
    }
    result
}

fn read_registry(path: &Path) -> Result<PluginRegistryConfig> {
    if !path.exists() {
        return Err(Error::registry(format!(
            "plugin registry file not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::registry(format!(
            "failed reading plugin registry '{}': {}",
            path.display(),
            e
        ))
    })?;

    PluginRegistryConfig::from_yaml(&content).map_err(|e| match e {
        Error::Registry(message) => Error::registry(format!("{} ({})", message, path.display())),
        other => other,
    })
}

fn validate_id(id: &str) -> std::result::Result<(), String> {
    let valid_first = id
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let valid_rest = id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-'));

    if id.is_empty() || id.len() > MAX_ID_LEN {
        Err(format!("id must be 1 to {} characters", MAX_ID_LEN))
    } else if !valid_first || !valid_rest {
        Err(format!("id '{}' must match ^[a-z0-9][a-z0-9_.-]*$", id))
    } else {
        Ok(())
    }
}

fn validate_area(area: &PluginUiArea) -> std::result::Result<(), String> {
    let title_len = area.title.chars().count();
    if title_len == 0 || title_len > MAX_UI_TEXT_LEN {
        return Err(format!("ui.area.title must be 1 to {} characters", MAX_UI_TEXT_LEN));
    }
    for (name, value) in [("icon", &area.icon), ("route_key", &area.route_key)] {
        if value.as_ref().map_or(false, |v| v.chars().count() > MAX_UI_TEXT_LEN) {
            return Err(format!("ui.area.{} must be at most {} characters", name, MAX_UI_TEXT_LEN));
        }
    }
    if area.order > MAX_UI_ORDER {
        return Err(format!("ui.area.order must be between 0 and {}", MAX_UI_ORDER));
    }
    Ok(())
}

/// Whether a settings key looks like it holds a credential
pub fn is_sensitive_key(key: &str) -> bool {
    let compact: String = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    SENSITIVE_MARKERS.iter().any(|marker| compact.contains(marker))
}

/// Variable name of a `${VAR_NAME}` reference
pub fn env_reference(value: &str) -> Option<&str> {
    let name = value.trim().strip_prefix("${")?.strip_suffix('}')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    let valid = (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}

fn check_sensitive_settings(settings: &PluginSettings, path: &str) -> std::result::Result<(), String> {
    settings
        .iter()
        .try_for_each(|(key, value)| check_sensitive_entry(key, value, &format!("{}.{}", path, key)))
}

fn check_sensitive_entry(
    key: &str,
    value: &serde_json::Value,
    location: &str,
) -> std::result::Result<(), String> {
    if is_sensitive_key(key) {
        let is_reference = value.as_str().and_then(env_reference).is_some();
        if !is_reference {
            return Err(format!(
                "{} looks sensitive and must be an environment reference like ${{ENV_VAR}}",
                location
            ));
        }
        return Ok(());
    }
    check_nested(value, location)
}

fn check_nested(value: &serde_json::Value, location: &str) -> std::result::Result<(), String> {
    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .try_for_each(|(key, item)| check_sensitive_entry(key, item, &format!("{}.{}", location, key))),
        serde_json::Value::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(index, item)| check_nested(item, &format!("{}[{}]", location, index))),
        _ => Ok(()),
    }
}

/// Replace every `${VAR}` string value with its environment value
///
/// Fails with the name of the first variable that is not set.
pub fn resolve_settings<F>(settings: &PluginSettings, lookup: F) -> std::result::Result<PluginSettings, String>
where
    F: Fn(&str) -> Option<String> + Copy,
{
    settings
        .iter()
        .map(|(key, value)| resolve_value(value, lookup).map(|value| (key.clone(), value)))
        .collect()
}

fn resolve_value<F>(value: &serde_json::Value, lookup: F) -> std::result::Result<serde_json::Value, String>
where
    F: Fn(&str) -> Option<String> + Copy,
{
    match value {
        serde_json::Value::String(text) => match env_reference(text) {
            Some(name) => lookup(name)
                .map(serde_json::Value::String)
                .ok_or_else(|| format!("environment variable '{}' is not set", name)),
            None => Ok(value.clone()),
        },
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, lookup))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(serde_json::Value::Array),
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(key, item)| resolve_value(item, lookup).map(|item| (key.clone(), item)))
            .collect::<std::result::Result<serde_json::Map<_, _>, String>>()
            .map(serde_json::Value::Object),
        _ => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_registry() {
        let yaml = r#"
version: 1
plugins:
  - id: noop
    backend:
      factory: builtin.noop
    capabilities: [ingest_hook, " ingest_hook"]
    ui:
      area:
        title: Noop
  - id: keyword_classifier
    enabled: false
    backend:
      factory: builtin.keyword_heuristic_classifier
    capabilities: [stream_classifier]
    settings:
      api_token: ${KEYWORD_TOKEN}
"#;
        let config = PluginRegistryConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.plugins.len(), 2);
        assert_eq!(config.plugins[0].capabilities, vec![Capability::IngestHook]);
        assert_eq!(config.plugins[0].ui.as_ref().unwrap().area.as_ref().unwrap().order, 100);
        assert_eq!(config.enabled_plugins().count(), 1);
    }

    #[test]
    fn test_empty_document_is_empty_registry() {
        let config = PluginRegistryConfig::from_yaml("").unwrap();
        assert!(config.plugins.is_empty());
        assert_eq!(config.version, 1);
    }

    #[test]
    fn test_structural_errors_are_fatal() {
        let cases = [
            ("- not a mapping", "root must be a mapping"),
            ("plugins: [{id: a, backend: {factory: x}, extra: 1}]", "unknown field"),
            ("plugins: [{id: a, backend: {factory: x}, capabilities: [telepathy]}]", "Unknown capability 'telepathy'"),
            ("plugins: [{id: a, backend: {factory: x}}, {id: a, backend: {factory: y}}]", "Duplicate plugin id 'a'"),
            ("plugins: [{id: Bad, backend: {factory: x}}]", "must match"),
            ("plugins: [{id: a, backend: {factory: ''}}]", "backend.factory"),
            ("plugins: [{id: a, backend: {factory: x}, ui: {area: {title: ''}}}]", "ui.area.title"),
            ("plugins: [{id: a, backend: {factory: x}, ui: {area: {title: t, order: 10001}}}]", "ui.area.order"),
            ("version: 0", "version"),
        ];
        for (yaml, expected) in cases {
            let err = PluginRegistryConfig::from_yaml(yaml).unwrap_err();
            assert!(matches!(err, Error::Registry(_)), "{}", yaml);
            assert!(err.to_string().contains(expected), "{} -> {}", yaml, err);
        }
    }

    #[test]
    fn test_sensitive_settings_require_env_reference() {
        let yaml = r#"
plugins:
  - id: a
    backend: {factory: x}
    settings:
      auth:
        Api-Key: plain-text
"#;
        let err = PluginRegistryConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("settings.auth.Api-Key"), "{}", err);

        let listed = r#"
plugins:
  - id: a
    backend: {factory: x}
    settings:
      providers:
        - name: primary
          api_key: ${PRIMARY_KEY}
        - name: backup
          api_key: plain-text-secret
"#;
        let err = PluginRegistryConfig::from_yaml(listed).unwrap_err();
        assert!(err.to_string().contains("settings.providers[1].api_key"), "{}", err);
        assert!(PluginRegistryConfig::from_yaml(&listed.replace("plain-text-secret", "${BACKUP_KEY}")).is_ok());

        assert!(is_sensitive_key("client_secret"));
        assert!(is_sensitive_key("ACCESS_KEY"));
        assert!(!is_sensitive_key("model"));
        assert_eq!(env_reference("${OPENAI_API_KEY}"), Some("OPENAI_API_KEY"));
        assert_eq!(env_reference("${1BAD}"), None);
        assert_eq!(env_reference("$OPENAI"), None);
    }

    #[test]
    fn test_resolve_settings() {
        let settings: PluginSettings = [
            ("api_token".to_string(), json!("${TOKEN}")),
            ("nested".to_string(), json!({"list": ["${TOKEN}", 3]})),
            ("model".to_string(), json!("small")),
        ]
        .into_iter()
        .collect();

        let lookup = |name: &str| (name == "TOKEN").then(|| "s3cr3t".to_string());
        let resolved = resolve_settings(&settings, lookup).unwrap();
        assert_eq!(resolved["api_token"], json!("s3cr3t"));
        assert_eq!(resolved["nested"], json!({"list": ["s3cr3t", 3]}));
        assert_eq!(resolved["model"], json!("small"));

        let err = resolve_settings(&settings, |_: &str| None).unwrap_err();
        assert_eq!(err, "environment variable 'TOKEN' is not set");
    }

    #[test]
    fn test_load_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugins.yaml");

        let err = load_registry_file(&path).unwrap_err();
        assert!(err.to_string().contains("not found"));

        std::fs::write(&path, "plugins: [{id: noop, backend: {factory: builtin.noop}}]").unwrap();
        let config = load_registry_file(&path).unwrap();
        assert_eq!(config.plugins[0].id, "noop");

        std::fs::write(&path, "plugins: [unclosed").unwrap();
        let err = load_registry_file(&path).unwrap_err();
        assert!(err.to_string().contains("invalid YAML"));
    }
}
