//! Runner discovery from well-known paths.
//!
//! Runners are discovered from the following locations (in order):
//!
//! 1. `$XDG_DATA_HOME/runner-bridge/runners/` (user runners)
//! 2. Directories supplied by the host configuration
//!
//! Each runner is a directory containing a `manifest.toml` file. When two
//! directories carry the same runner id the first one found wins.

use crate::error::RuntimeResult;
use crate::manifest::RunnerManifest;
use crate::sources::RunnerSources;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A runner directory with its parsed manifest.
#[derive(Debug, Clone)]
pub struct RunnerPath {
    /// Path to the runner directory.
    pub path: PathBuf,

    /// Parsed manifest.
    pub manifest: RunnerManifest,
}

impl RunnerPath {
    pub fn id(&self) -> &str {
        &self.manifest.runner.id
    }

    /// Path to the main script.
    pub fn entry_point_path(&self) -> PathBuf {
        self.path.join(self.manifest.entry_point())
    }

    /// Read every script the manifest names.
    pub fn load_sources(&self) -> RuntimeResult<RunnerSources> {
        RunnerSources::from_manifest(&self.path, &self.manifest)
    }
}

/// Get the user runners directory.
pub fn user_runners_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "raibid-labs", "runner-bridge")
        .map(|dirs| dirs.data_dir().join("runners"))
}

/// Discover runners in the user directory followed by `extra_dirs`.
pub fn discover_runners(extra_dirs: &[PathBuf]) -> RuntimeResult<Vec<RunnerPath>> {
    let mut runners = Vec::new();
    let mut seen_ids = HashSet::new();

    if let Some(user_dir) = user_runners_dir() {
        debug!("Scanning user runners directory: {:?}", user_dir);
        discover_in_directory(&user_dir, &mut runners, &mut seen_ids)?;
    }

    for dir in extra_dirs {
        debug!("Scanning runners directory: {:?}", dir);
        discover_in_directory(dir, &mut runners, &mut seen_ids)?;
    }

    info!("Discovered {} runners", runners.len());
    Ok(runners)
}

/// Discover runners in a specific directory.
pub fn discover_in_directory(
    dir: &Path,
    runners: &mut Vec<RunnerPath>,
    seen_ids: &mut HashSet<String>,
) -> RuntimeResult<()> {
    if !dir.exists() {
        return Ok(());
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("Failed to read runners directory {:?}: {}", dir, e);
            return Ok(());
        }
    };

    let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();

    for path in paths {
        if !path.is_dir() {
            continue;
        }

        let manifest_path = path.join("manifest.toml");
        if !manifest_path.exists() {
            debug!("Skipping {:?}: no manifest.toml", path);
            continue;
        }

        match RunnerManifest::from_file(&manifest_path) {
            Ok(manifest) => {
                let id = manifest.runner.id.clone();
                if !seen_ids.insert(id.clone()) {
                    debug!("Skipping duplicate runner: {}", id);
                    continue;
                }

                info!(
                    "Discovered {} runner: {} at {:?}",
                    manifest.runner.kind, id, path
                );
                runners.push(RunnerPath { path, manifest });
            }
            Err(e) => {
                warn!("Failed to load manifest from {:?}: {}", manifest_path, e);
            }
        }
    }

    Ok(())
}
