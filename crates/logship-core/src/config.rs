use crate::error::AgentError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main configuration for the logship agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Collection endpoint base URL
    pub server_url: String,

    /// API key for authentication
    pub api_key: String,

    /// Application name attached to every delivered record
    pub application: String,

    /// Deployment environment (production, staging, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// Log sources to tail
    pub sources: Vec<SourceSpec>,

    /// Number of buffered records that triggers an immediate flush
    pub batch_size: usize,

    /// Flush interval in milliseconds
    pub flush_interval_ms: u64,

    /// Heartbeat interval in milliseconds
    pub heartbeat_interval_ms: u64,

    /// Enable debug diagnostics
    pub debug: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            api_key: String::new(),
            application: String::new(),
            environment: None,
            sources: Vec::new(),
            batch_size: 100,
            flush_interval_ms: 5_000,
            heartbeat_interval_ms: 30_000,
            debug: false,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, AgentError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, AgentError> {
        toml::from_str(content)
            .map_err(|e| AgentError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Serialize configuration to a TOML string
    pub fn to_toml(&self) -> Result<String, AgentError> {
        toml::to_string_pretty(self)
            .map_err(|e| AgentError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Check that all required fields are present
    ///
    /// Missing required fields are a fatal startup error.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.server_url.is_empty() {
            return Err(AgentError::Config("server_url is required".to_string()));
        }
        if self.api_key.is_empty() {
            return Err(AgentError::Config("api_key is required".to_string()));
        }
        if self.application.is_empty() {
            return Err(AgentError::Config("application is required".to_string()));
        }
        if self.sources.is_empty() {
            return Err(AgentError::Config(
                "at least one log source is required".to_string(),
            ));
        }
        for source in &self.sources {
            if source.name.is_empty() || source.path.is_empty() {
                return Err(AgentError::Config(
                    "every source needs a name and a path".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Configuration for one logical log source
///
/// Immutable once discovery has expanded it into concrete files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Unique name for this source
    pub name: String,

    /// File path or glob pattern
    pub path: String,

    /// Declared log format (json, nginx, apache, syslog, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Custom parser regex, overrides the built-in patterns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Static labels attached to every record from this source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,

    /// Read the whole file from the start instead of tailing new lines
    #[serde(default)]
    pub from_beginning: bool,
}

impl SourceSpec {
    /// Whether the path is a glob pattern rather than a literal file
    pub fn is_glob(&self) -> bool {
        self.path.contains(['*', '?', '['])
    }

    /// Derive the per-file spec for one concrete path expanded from a glob
    ///
    /// The derived name is `{name}:{basename}` so multiple files from one
    /// pattern stay distinguishable.
    pub fn for_file(&self, path: &Path) -> SourceSpec {
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        SourceSpec {
            name: format!("{}:{}", self.name, basename),
            path: path.to_string_lossy().to_string(),
            ..self.clone()
        }
    }
}
