//! Runner source texts as handed over by a loader.

use crate::capability::CapabilitySet;
use crate::context::ContextOptions;
use crate::error::{RuntimeError, RuntimeResult};
use crate::handlers::UnauthorizedPolicy;
use crate::manifest::{RunnerKind, RunnerManifest};
use crate::scripts::DEFAULT_BOOTSTRAP;
use std::path::Path;
use tracing::debug;

/// Everything needed to create a runner's context.
#[derive(Debug, Clone)]
pub struct RunnerSources {
    pub id: String,
    pub kind: RunnerKind,

    /// The runner's main script.
    pub main: String,

    /// Shared helper code, evaluated first.
    pub commons: String,

    /// Message-handler scripts as `(name, text)`, evaluated in order.
    pub auxiliary: Vec<(String, String)>,

    /// Expression producing the root object; `None` uses the default bootstrap.
    pub bootstrap: Option<String>,

    /// Capability grant overriding the host default.
    pub capabilities: Option<CapabilitySet>,

    /// 401 handling overriding the host default.
    pub unauthorized_policy: Option<UnauthorizedPolicy>,
}

impl RunnerSources {
    pub fn new(id: impl Into<String>, kind: RunnerKind, main: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            main: main.into(),
            commons: String::new(),
            auxiliary: Vec::new(),
            bootstrap: None,
            capabilities: None,
            unauthorized_policy: None,
        }
    }

    pub fn with_commons(mut self, commons: impl Into<String>) -> Self {
        self.commons = commons.into();
        self
    }

    pub fn with_auxiliary(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.auxiliary.push((name.into(), text.into()));
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: impl Into<String>) -> Self {
        self.bootstrap = Some(bootstrap.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn with_unauthorized_policy(mut self, policy: UnauthorizedPolicy) -> Self {
        self.unauthorized_policy = Some(policy);
        self
    }

    /// The bootstrap expression that will be evaluated.
    pub fn bootstrap(&self) -> &str {
        self.bootstrap.as_deref().unwrap_or(DEFAULT_BOOTSTRAP)
    }

    /// Host options with this runner's own grants applied.
    pub fn apply_to(&self, mut options: ContextOptions) -> ContextOptions {
        if let Some(capabilities) = &self.capabilities {
            options.capabilities = capabilities.clone();
        }
        if let Some(policy) = &self.unauthorized_policy {
            options.unauthorized_policy = policy.clone();
        }
        options
    }

    /// Read a runner directory described by its `manifest.toml`.
    pub fn from_dir(dir: &Path) -> RuntimeResult<Self> {
        let manifest = RunnerManifest::from_file(&dir.join("manifest.toml"))?;
        Self::from_manifest(dir, &manifest)
    }

    /// Read the scripts a parsed manifest points at.
    pub fn from_manifest(dir: &Path, manifest: &RunnerManifest) -> RuntimeResult<Self> {
        let meta = &manifest.runner;
        let main = read_source(&dir.join(manifest.entry_point()))?;
        let commons = match &meta.commons {
            Some(file) => read_source(&dir.join(file))?,
            None => String::new(),
        };
        let auxiliary = meta
            .auxiliary
            .iter()
            .map(|file| Ok((file.clone(), read_source(&dir.join(file))?)))
            .collect::<RuntimeResult<Vec<_>>>()?;
        let bootstrap = meta
            .bootstrap
            .as_ref()
            .map(|file| read_source(&dir.join(file)))
            .transpose()?;

        debug!(
            runner = %meta.id,
            dir = %dir.display(),
            auxiliary = auxiliary.len(),
            "Read runner sources"
        );

        Ok(Self {
            id: meta.id.clone(),
            kind: meta.kind,
            main,
            commons,
            auxiliary,
            bootstrap,
            capabilities: manifest.capability_set(),
            unauthorized_policy: manifest.unauthorized_policy(),
        })
    }
}

fn read_source(path: &Path) -> RuntimeResult<String> {
    std::fs::read_to_string(path).map_err(|source| RuntimeError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use tempfile::TempDir;

    #[test]
    fn test_from_dir_reads_all_scripts() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("manifest.toml"),
            r#"
capabilities = ["log"]

[runner]
id = "sample"
entry_point = "main.js"
commons = "commons.js"
auxiliary = ["a.js", "b.js"]
"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("main.js"), "var main = 1;").unwrap();
        std::fs::write(dir.path().join("commons.js"), "var commons = 1;").unwrap();
        std::fs::write(dir.path().join("a.js"), "var a = 1;").unwrap();
        std::fs::write(dir.path().join("b.js"), "var b = 1;").unwrap();

        let sources = RunnerSources::from_dir(dir.path()).unwrap();
        assert_eq!(sources.id, "sample");
        assert_eq!(sources.main, "var main = 1;");
        assert_eq!(sources.commons, "var commons = 1;");
        let names: Vec<_> = sources.auxiliary.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a.js", "b.js"]);
        assert_eq!(sources.bootstrap(), DEFAULT_BOOTSTRAP);

        let options = sources.apply_to(ContextOptions::default());
        assert!(options.capabilities.has(Capability::Log));
        assert!(!options.capabilities.has(Capability::Network));
    }

    #[test]
    fn test_missing_script_is_source_unavailable() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("manifest.toml"), "[runner]\nid = \"gone\"\n").unwrap();

        let err = RunnerSources::from_dir(dir.path()).unwrap_err();
        match err {
            RuntimeError::SourceUnavailable { path, .. } => {
                assert!(path.ends_with("runner.js"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
