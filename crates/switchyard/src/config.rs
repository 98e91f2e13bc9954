//! Configuration for a switchyard session.
//!
//! Every section and field has a default, so an empty (or missing) file is a
//! valid configuration.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to parse config: {0}")]
  Parse(#[from] toml::de::Error),

  #[error("watcher.max_delay_ms ({max_delay_ms}) must be greater than watcher.debounce_ms ({debounce_ms})")]
  InvalidDebounce { debounce_ms: u64, max_delay_ms: u64 },

  #[error("session.max_pending must be at least 1")]
  InvalidPendingCap,

  #[error("session.max_buffered_events must be at least 1")]
  InvalidEventCap,
}

// ============================================================================
// Sections
// ============================================================================

/// Identity reported in the handshake response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub name: String,
  pub version: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      name: "switchyard".to_string(),
      version: env!("CARGO_PKG_VERSION").to_string(),
    }
  }
}

/// How the analysis topology is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Composition {
  /// Scan the source roots for non-Java sources
  #[default]
  Auto,
  Mixed,
  JavaOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
  /// Project root; relative source roots are resolved against it
  pub root: PathBuf,
  pub source_roots: Vec<PathBuf>,
  pub composition: Composition,
}

impl Default for ProjectConfig {
  fn default() -> Self {
    Self {
      root: PathBuf::from("."),
      source_roots: vec![PathBuf::from("src")],
      composition: Composition::Auto,
    }
  }
}

impl ProjectConfig {
  pub fn resolved_source_roots(&self) -> Vec<PathBuf> {
    self.source_roots.iter().map(|r| self.root.join(r)).collect()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
  /// Requests buffered before the handshake; later ones are rejected
  pub max_pending: usize,
  /// Worker events held back before the handshake; later ones are dropped
  pub max_buffered_events: usize,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      max_pending: 1024,
      max_buffered_events: 4096,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
  pub enabled: bool,
  /// Quiet period after the last change before recompiling (default: 500)
  pub debounce_ms: u64,
  /// Upper bound on how long a steady stream of changes can defer a recompile (default: 5000)
  pub max_delay_ms: u64,
}

impl Default for WatcherConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      debounce_ms: 500,
      max_delay_ms: 5000,
    }
  }
}

impl WatcherConfig {
  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }

  pub fn max_delay(&self) -> Duration {
    Duration::from_millis(self.max_delay_ms)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
  /// Shut the session down once the startup index refresh completes
  pub exit_after_index: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
  /// How long teardown waits for the search engine to close (default: 10000)
  pub search_grace_ms: u64,
}

impl Default for ShutdownConfig {
  fn default() -> Self {
    Self { search_grace_ms: 10_000 }
  }
}

impl ShutdownConfig {
  pub fn search_grace(&self) -> Duration {
    Duration::from_millis(self.search_grace_ms)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  pub level: String,
  /// Write rolling log files here instead of stderr
  #[serde(skip_serializing_if = "Option::is_none")]
  pub directory: Option<PathBuf>,
  /// Log file rotation: "daily", "hourly", "never"
  pub rotation: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      directory: None,
      rotation: "daily".to_string(),
    }
  }
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub server: ServerConfig,
  pub project: ProjectConfig,
  pub session: SessionConfig,
  pub watcher: WatcherConfig,
  pub index: IndexConfig,
  pub shutdown: ShutdownConfig,
  pub log: LogConfig,
}

impl Config {
  /// Load and validate a config file. A missing file yields the defaults.
  pub async fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(Self::default());
      }
      Err(source) => {
        return Err(ConfigError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    Self::from_toml_str(&content)
  }

  pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.watcher.max_delay_ms <= self.watcher.debounce_ms {
      return Err(ConfigError::InvalidDebounce {
        debounce_ms: self.watcher.debounce_ms,
        max_delay_ms: self.watcher.max_delay_ms,
      });
    }
    if self.session.max_pending == 0 {
      return Err(ConfigError::InvalidPendingCap);
    }
    if self.session.max_buffered_events == 0 {
      return Err(ConfigError::InvalidEventCap);
    }
    Ok(())
  }
}
