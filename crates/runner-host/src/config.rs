//! Bridge configuration.
//!
//! Read from `$XDG_CONFIG_HOME/runner-bridge/config.toml`. A commented
//! default file is written there the first time the host starts without one.

use anyhow::{Context, Result};
use runner_runtime::{CapabilitySet, ContextOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A runner call that never settles is abandoned after this long.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 60_000;

/// Main bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Script runtime limits and timeouts
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Where runners are found and what they may use
    #[serde(default)]
    pub runners: RunnersConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Script runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Heap limit per context, in bytes. Unlimited when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit_bytes: Option<usize>,
    /// Stack limit per context, in bytes. Engine default when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_stack_size_bytes: Option<usize>,
    /// Timeout for network requests that do not set their own
    /// Default: 30000
    pub default_network_timeout_ms: u64,
    /// How long the host waits for a runner call
    /// Default: 60000
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timeout_ms: Option<u64>,
}

/// Runner discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnersConfig {
    /// Extra directories scanned after the user runners directory
    pub directories: Vec<PathBuf>,
    /// Capabilities granted to runners whose manifest does not list any
    /// Default: all of network, store, log, timer
    pub capabilities: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: None,
            max_stack_size_bytes: None,
            default_network_timeout_ms: 30_000,
            call_timeout_ms: Some(DEFAULT_CALL_TIMEOUT_MS),
        }
    }
}

impl Default for RunnersConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            capabilities: CapabilitySet::all()
                .iter()
                .map(|cap| cap.as_str().to_string())
                .collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Read, parse and validate the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read bridge config {}", path.display()))?;
        let config = Self::parse(&text)
            .with_context(|| format!("Invalid bridge config {}", path.display()))?;
        tracing::debug!("Loaded bridge configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn parse(text: &str) -> Result<Self> {
        let config: BridgeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from [`default_config_path`](Self::default_config_path), writing
    /// the documented default file first when none exists yet.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_config_path()?;
        if !path.exists() {
            Self::create_default_file(&path)?;
        }
        Self::load(&path)
    }

    /// `$XDG_CONFIG_HOME/runner-bridge/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        directories::ProjectDirs::from("com", "raibid-labs", "runner-bridge")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .context("No home directory to place the bridge config in")
    }

    /// Write the documented default configuration to `path`.
    pub fn create_default_file(path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create config directory {}", dir.display()))?;
        }
        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Cannot write default config {}", path.display()))?;

        tracing::info!("Wrote default bridge configuration to {}", path.display());
        Ok(())
    }

    fn default_config_content() -> String {
        r#"# Runner Bridge Configuration

[runtime]
# Heap limit per runner context, in bytes
# If not specified, contexts are unlimited
# memory_limit_bytes = 67108864

# Stack limit per runner context, in bytes
# max_stack_size_bytes = 1048576

# Timeout for runner network requests that do not set one, in milliseconds
# Default: 30000
default_network_timeout_ms = 30000

# How long the host waits for any runner call, in milliseconds
# Default: 60000
call_timeout_ms = 60000

[runners]
# Extra directories to scan for runners, after the user runners directory
# directories = ["/opt/runners"]

# Capabilities granted to runners whose manifest does not list its own
# Available: network, store, log, timer
capabilities = ["network", "store", "log", "timer"]

[logging]
# Log level: trace, debug, info, warn, error
# RUST_LOG overrides this value when set
# Default: "info"
level = "info"
"#
        .to_string()
    }

    /// Reject values no runner could work with.
    pub fn validate(&self) -> Result<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "logging.level must be one of {}, got '{}'",
                LEVELS.join("/"),
                self.logging.level
            );
        }

        if self.runtime.default_network_timeout_ms == 0 {
            anyhow::bail!("runtime.default_network_timeout_ms must be greater than 0");
        }

        if self.runtime.call_timeout_ms == Some(0) {
            anyhow::bail!("runtime.call_timeout_ms must be greater than 0");
        }

        let (_, unknown) = CapabilitySet::from_strings(&self.runners.capabilities);
        if !unknown.is_empty() {
            anyhow::bail!("Unknown runner capabilities: {}", unknown.join(", "));
        }

        Ok(())
    }

    /// Options for contexts created under this configuration.
    pub fn context_options(&self) -> ContextOptions {
        let (capabilities, _) = CapabilitySet::from_strings(&self.runners.capabilities);
        ContextOptions {
            capabilities,
            memory_limit: self.runtime.memory_limit_bytes,
            max_stack_size: self.runtime.max_stack_size_bytes,
            default_network_timeout: Duration::from_millis(self.runtime.default_network_timeout_ms),
            ..ContextOptions::default()
        }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.runtime.call_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner_runtime::Capability;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.runtime.default_network_timeout_ms, 30_000);
        assert_eq!(config.call_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.runners.capabilities.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_content_parses_to_defaults() {
        let config: BridgeConfig = toml::from_str(&BridgeConfig::default_config_content()).unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_load_partial_config() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[runtime]
call_timeout_ms = 2500

[runners]
directories = ["/srv/runners"]
capabilities = ["log", "store"]
"#
        )
        .unwrap();

        let config = BridgeConfig::load(temp_file.path()).unwrap();
        assert_eq!(config.call_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.runners.directories, vec![PathBuf::from("/srv/runners")]);
        assert_eq!(config.logging.level, "info");

        let options = config.context_options();
        assert!(options.capabilities.has(Capability::Log));
        assert!(options.capabilities.has(Capability::Store));
        assert!(!options.capabilities.has(Capability::Network));
        assert_eq!(options.default_network_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_call_timeout_defaults_when_omitted() {
        let config = BridgeConfig::parse("[logging]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(config.runtime.call_timeout_ms, Some(DEFAULT_CALL_TIMEOUT_MS));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = BridgeConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = BridgeConfig::default();
        config.runtime.default_network_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.runtime.call_timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_capability_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[runners]\ncapabilities = [\"filesystem\"]").unwrap();

        let err = BridgeConfig::load(temp_file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Unknown runner capabilities"));
    }

    #[test]
    fn test_create_default_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        BridgeConfig::create_default_file(&path).unwrap();
        let config = BridgeConfig::load(&path).unwrap();
        assert_eq!(config, BridgeConfig::default());
    }
}
