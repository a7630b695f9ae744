//! # Runner Registry
//!
//! Owns every loaded runner, keyed by runner id. The registry is a plain
//! value created by the host's composition root and passed to whoever needs
//! it.
//!
//! Loading is de-duplicated per id: concurrent loads of the same runner share
//! one slot, the first caller performs the load and the others await its
//! result. A load that fails leaves nothing behind once no other caller is
//! waiting to retry it, and a runner unloaded while its load was still
//! returning is never put back.

use crate::config::BridgeConfig;
use crate::runner::Runner;
use crate::source::ContentSource;
use crate::tracker::ContentTracker;
use parking_lot::Mutex;
use runner_runtime::{
    discover_runners, ContextOptions, HostServices, RunnerKind, RunnerSources, RuntimeError,
    RuntimeResult,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// A registered runner, wrapped in the front for its kind.
#[derive(Debug, Clone)]
pub enum LoadedRunner {
    Source(Arc<ContentSource>),
    Tracker(Arc<ContentTracker>),
}

impl LoadedRunner {
    pub fn runner(&self) -> &Arc<Runner> {
        match self {
            LoadedRunner::Source(source) => source.runner(),
            LoadedRunner::Tracker(tracker) => tracker.runner(),
        }
    }

    pub fn id(&self) -> &str {
        self.runner().id()
    }

    pub fn kind(&self) -> RunnerKind {
        self.runner().kind()
    }

    fn summary(&self) -> RunnerSummary {
        let info = self.runner().info();
        RunnerSummary {
            id: info.id.clone(),
            name: info.name.clone(),
            version: info.version,
            kind: self.kind(),
        }
    }
}

/// Listing entry for a registered runner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSummary {
    pub id: String,
    pub name: String,
    pub version: f64,
    pub kind: RunnerKind,
}

type Slot = Arc<OnceCell<LoadedRunner>>;

/// Registry of loaded runners.
pub struct RunnerRegistry {
    services: HostServices,
    options: ContextOptions,
    call_timeout: Option<Duration>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl RunnerRegistry {
    /// Create an empty registry. Every runner it loads shares `services`.
    pub fn new(services: HostServices, options: ContextOptions) -> Self {
        Self {
            services,
            options,
            call_timeout: None,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &BridgeConfig, services: HostServices) -> Self {
        Self::new(services, config.context_options()).with_call_timeout(config.call_timeout())
    }

    /// Caller-side timeout applied to runners loaded from now on.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Load a runner, or return the one already registered under its id.
    ///
    /// # Errors
    ///
    /// Any creation or descriptor failure, plus
    /// [`RuntimeError::RunnerInfoInitFailed`] when the runner declares an
    /// `info.id` different from the id it was loaded under.
    pub async fn load(&self, sources: RunnerSources) -> RuntimeResult<LoadedRunner> {
        let id = sources.id.clone();
        let slot = Arc::clone(self.slots.lock().entry(id.clone()).or_default());

        let result = slot
            .get_or_try_init(|| self.instantiate(sources))
            .await
            .cloned();

        let mut slots = self.slots.lock();
        let registered = slots
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, &slot));
        match result {
            Ok(loaded) if registered => Ok(loaded),
            Ok(loaded) => {
                // The slot was unloaded while this caller held it.
                drop(slots);
                loaded.runner().unload();
                debug!(runner = %id, "Runner unloaded before its load returned");
                Err(RuntimeError::ContextClosed(id))
            }
            Err(e) => {
                // Callers still holding the slot retry the load into it, so it
                // is only dropped by the last one out.
                if registered && !slot.initialized() && Arc::strong_count(&slot) <= 2 {
                    slots.remove(&id);
                }
                warn!(runner = %id, "Failed to load runner: {}", e);
                Err(e)
            }
        }
    }

    async fn instantiate(&self, sources: RunnerSources) -> RuntimeResult<LoadedRunner> {
        let id = sources.id.clone();
        debug!(runner = %id, kind = %sources.kind, "Loading runner");

        let runner = Runner::load(sources, self.services.clone(), self.options.clone())
            .await?
            .with_call_timeout(self.call_timeout);

        if runner.info().id != id {
            let declared = runner.info().id.clone();
            runner.unload();
            return Err(RuntimeError::RunnerInfoInitFailed(format!(
                "runner declares id '{}' but was loaded as '{}'",
                declared, id
            )));
        }

        let runner = Arc::new(runner);
        let loaded = match runner.kind() {
            RunnerKind::Source => LoadedRunner::Source(Arc::new(ContentSource::new(runner)?)),
            RunnerKind::Tracker => LoadedRunner::Tracker(Arc::new(ContentTracker::new(runner)?)),
        };
        info!(runner = %id, "Runner registered");
        Ok(loaded)
    }

    /// Get a registered runner by id.
    pub fn get(&self, id: &str) -> Option<LoadedRunner> {
        self.slots.lock().get(id).and_then(|slot| slot.get().cloned())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Get a registered source runner.
    pub fn source(&self, id: &str) -> RuntimeResult<Arc<ContentSource>> {
        match self.require(id)? {
            LoadedRunner::Source(source) => Ok(source),
            LoadedRunner::Tracker(_) => Err(RuntimeError::RunnerKindMismatch {
                id: id.to_string(),
                expected: RunnerKind::Source.to_string(),
            }),
        }
    }

    /// Get a registered tracker runner.
    pub fn tracker(&self, id: &str) -> RuntimeResult<Arc<ContentTracker>> {
        match self.require(id)? {
            LoadedRunner::Tracker(tracker) => Ok(tracker),
            LoadedRunner::Source(_) => Err(RuntimeError::RunnerKindMismatch {
                id: id.to_string(),
                expected: RunnerKind::Tracker.to_string(),
            }),
        }
    }

    fn require(&self, id: &str) -> RuntimeResult<LoadedRunner> {
        self.get(id)
            .ok_or_else(|| RuntimeError::RunnerNotFound(id.to_string()))
    }

    /// Remove a runner and destroy its context.
    pub fn unload(&self, id: &str) -> RuntimeResult<()> {
        let loaded = {
            let mut slots = self.slots.lock();
            match slots.get(id).and_then(|slot| slot.get().cloned()) {
                Some(loaded) => {
                    slots.remove(id);
                    loaded
                }
                None => return Err(RuntimeError::RunnerNotFound(id.to_string())),
            }
        };
        loaded.runner().unload();
        info!(runner = %id, "Runner unloaded");
        Ok(())
    }

    /// Unload every registered runner.
    pub fn unload_all(&self) {
        let drained: Vec<Slot> = {
            let mut slots = self.slots.lock();
            slots.drain().map(|(_, slot)| slot).collect()
        };
        for slot in drained {
            if let Some(loaded) = slot.get() {
                loaded.runner().unload();
            }
        }
    }

    /// Ids of registered runners, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of registered runners.
    pub fn count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Summaries of registered runners, sorted by id.
    pub fn list(&self) -> Vec<RunnerSummary> {
        let mut summaries: Vec<RunnerSummary> = self
            .slots
            .lock()
            .values()
            .filter_map(|slot| slot.get().map(LoadedRunner::summary))
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Discover runners on disk and load each of them.
    ///
    /// Individual failures are logged and skipped.
    pub async fn discover_and_load(&self, extra_dirs: &[PathBuf]) -> RuntimeResult<Vec<LoadedRunner>> {
        let mut loaded = Vec::new();
        for found in discover_runners(extra_dirs)? {
            let sources = match found.load_sources() {
                Ok(sources) => sources,
                Err(e) => {
                    warn!(runner = %found.id(), "Failed to read runner sources: {}", e);
                    continue;
                }
            };
            if let Ok(runner) = self.load(sources).await {
                loaded.push(runner);
            }
        }
        info!("Loaded {} runners", loaded.len());
        Ok(loaded)
    }
}

impl Drop for RunnerRegistry {
    fn drop(&mut self) {
        self.unload_all();
    }
}

impl std::fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerRegistry")
            .field("runners", &self.ids())
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}
