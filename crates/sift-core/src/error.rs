//! Error types for Sift

/// Result type alias using Sift's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Sift operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed search query
    #[error("syntax error: {message}")]
    Syntax {
        message: String,
        /// Character offset of the offending token, when known
        index: Option<usize>,
    },

    /// Stream definition rejected at construction or update time
    #[error("validation error: {0}")]
    Validation(String),

    /// Plugin registry document is unusable as a whole
    #[error("plugin registry error: {0}")]
    Registry(String),

    /// A single plugin could not be constructed
    #[error("plugin '{plugin_id}' failed to load: {message}")]
    PluginLoad { plugin_id: String, message: String },

    /// A plugin declares a capability it does not implement
    #[error("plugin '{plugin_id}' does not satisfy capability '{capability}': {message}")]
    CapabilityContract {
        plugin_id: String,
        capability: String,
        message: String,
    },

    /// A plugin call returned an error
    #[error("plugin '{plugin_id}' failed during '{capability}': {message}")]
    PluginInvocation {
        plugin_id: String,
        capability: String,
        message: String,
    },

    /// A plugin call exceeded its deadline
    #[error("plugin '{plugin_id}' timed out during '{capability}' after {timeout_ms}ms")]
    PluginTimeout {
        plugin_id: String,
        capability: String,
        timeout_ms: u64,
    },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new syntax error
    pub fn syntax(msg: impl Into<String>, index: Option<usize>) -> Self {
        Self::Syntax {
            message: msg.into(),
            index,
        }
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new registry error
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    /// Create a new plugin load error
    pub fn plugin_load(plugin_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::PluginLoad {
            plugin_id: plugin_id.into(),
            message: msg.into(),
        }
    }

    /// Create a new plugin invocation error
    pub fn plugin_invocation(
        plugin_id: impl Into<String>,
        capability: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::PluginInvocation {
            plugin_id: plugin_id.into(),
            capability: capability.into(),
            message: msg.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error was caused by caller input and should be reported as a
    /// validation failure rather than a server fault
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Syntax { .. } | Self::Validation(_))
    }

    /// Short variant name used as the `error_type` log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "SyntaxError",
            Self::Validation(_) => "ValidationError",
            Self::Registry(_) => "RegistryError",
            Self::PluginLoad { .. } => "PluginLoadError",
            Self::CapabilityContract { .. } => "CapabilityContractError",
            Self::PluginInvocation { .. } => "PluginInvocationError",
            Self::PluginTimeout { .. } => "PluginTimeoutError",
            Self::Config(_) => "ConfigError",
            Self::Io(_) => "IoError",
            Self::Serialization(_) => "SerializationError",
            Self::Internal(_) => "InternalError",
        }
    }
}
