//! Runner manifest parsing.
//!
//! Each runner directory has a `manifest.toml` naming its scripts and the
//! capabilities it needs.

use crate::capability::CapabilitySet;
use crate::error::{RuntimeError, RuntimeResult};
use crate::handlers::UnauthorizedPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::warn;

/// Runner manifest structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerManifest {
    /// Runner metadata.
    pub runner: RunnerMetadata,

    /// Capabilities to grant. Absent means the host's defaults.
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,

    /// Authentication housekeeping.
    #[serde(default)]
    pub auth: Option<AuthSettings>,
}

/// Runner metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerMetadata {
    /// Identifier the runner is registered under.
    pub id: String,

    /// Which protocol the runner implements.
    #[serde(default)]
    pub kind: RunnerKind,

    /// Main script (defaults to `runner.js`).
    #[serde(default)]
    pub entry_point: Option<String>,

    /// Shared helpers evaluated before anything else.
    #[serde(default)]
    pub commons: Option<String>,

    /// Message-handler scripts, evaluated in order after the main script.
    #[serde(default)]
    pub auxiliary: Vec<String>,

    /// Expression script producing the root object.
    #[serde(default)]
    pub bootstrap: Option<String>,
}

/// Kind of runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    /// Provides content: catalog, chapters, pages.
    #[default]
    Source,
    /// Tracks reading progress against an external service.
    Tracker,
}

impl RunnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerKind::Source => "source",
            RunnerKind::Tracker => "tracker",
        }
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Store keys removed when a request comes back 401.
    #[serde(default)]
    pub clear_on_unauthorized: Vec<String>,
}

impl RunnerManifest {
    /// Load a manifest from a TOML file.
    pub fn from_file(path: &Path) -> RuntimeResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|source| RuntimeError::SourceUnavailable {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_str(&content)
    }

    /// Parse a manifest from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> RuntimeResult<Self> {
        let manifest: RunnerManifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> RuntimeResult<()> {
        if self.runner.id.trim().is_empty() {
            return Err(RuntimeError::InvalidManifest(
                "Runner ID cannot be empty".to_string(),
            ));
        }

        if self.entry_point().trim().is_empty() {
            return Err(RuntimeError::InvalidManifest(
                "Entry point cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Capabilities the manifest asks for, if it lists any.
    pub fn capability_set(&self) -> Option<CapabilitySet> {
        let names = self.capabilities.as_ref()?;
        let (set, unknown) = CapabilitySet::from_strings(names);
        if !unknown.is_empty() {
            warn!(runner = %self.runner.id, ?unknown, "Ignoring unknown capabilities");
        }
        Some(set)
    }

    /// 401 handling requested by the manifest.
    pub fn unauthorized_policy(&self) -> Option<UnauthorizedPolicy> {
        let auth = self.auth.as_ref()?;
        if auth.clear_on_unauthorized.is_empty() {
            return None;
        }
        Some(UnauthorizedPolicy::ClearStoreKeys(
            auth.clear_on_unauthorized.clone(),
        ))
    }

    /// Get the entry point file name.
    pub fn entry_point(&self) -> &str {
        self.runner.entry_point.as_deref().unwrap_or("runner.js")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;

    #[test]
    fn test_parse_manifest() {
        let toml = r#"
capabilities = ["network", "store", "webcam"]

[runner]
id = "test-tracker"
kind = "tracker"
commons = "commons.js"
auxiliary = ["handlers.js", "events.js"]

[auth]
clear_on_unauthorized = ["token"]
"#;

        let manifest = RunnerManifest::from_str(toml).unwrap();
        assert_eq!(manifest.runner.id, "test-tracker");
        assert_eq!(manifest.runner.kind, RunnerKind::Tracker);
        assert_eq!(manifest.entry_point(), "runner.js");
        assert_eq!(manifest.runner.auxiliary.len(), 2);

        let caps = manifest.capability_set().unwrap();
        assert!(caps.has(Capability::Network));
        assert!(caps.has(Capability::Store));
        assert!(!caps.has(Capability::Timer));

        assert_eq!(
            manifest.unauthorized_policy(),
            Some(UnauthorizedPolicy::ClearStoreKeys(vec!["token".to_string()]))
        );
    }

    #[test]
    fn test_defaults() {
        let manifest = RunnerManifest::from_str("[runner]\nid = \"plain\"\n").unwrap();
        assert_eq!(manifest.runner.kind, RunnerKind::Source);
        assert!(manifest.capability_set().is_none());
        assert!(manifest.unauthorized_policy().is_none());
    }

    #[test]
    fn test_invalid_manifest() {
        let toml = r#"
[runner]
id = ""
"#;

        let result = RunnerManifest::from_str(toml);
        assert!(matches!(result, Err(RuntimeError::InvalidManifest(_))));
    }
}
