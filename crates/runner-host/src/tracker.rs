//! Content tracker runners.

use crate::models::{EntryForm, TrackItem, TrackProgressUpdate, TrackStatus};
use crate::runner::Runner;
use runner_runtime::{encode, DynamicValue, RunnerKind, RuntimeError, RuntimeResult};
use std::sync::Arc;

/// Typed front for a runner of kind `tracker`.
#[derive(Debug)]
pub struct ContentTracker {
    runner: Arc<Runner>,
}

impl ContentTracker {
    /// Wrap a loaded runner. Fails if the runner is not a tracker.
    pub fn new(runner: Arc<Runner>) -> RuntimeResult<Self> {
        if runner.kind() != RunnerKind::Tracker {
            return Err(RuntimeError::RunnerKindMismatch {
                id: runner.id().to_string(),
                expected: RunnerKind::Tracker.to_string(),
            });
        }
        Ok(Self { runner })
    }

    pub fn runner(&self) -> &Arc<Runner> {
        &self.runner
    }

    pub fn id(&self) -> &str {
        self.runner.id()
    }

    pub async fn get_track_item(&self, id: &str) -> RuntimeResult<TrackItem> {
        self.runner.call("getTrackItem", vec![id.into()]).await
    }

    /// Look up tracker entries matching any of `titles`.
    pub async fn get_results_for_titles(&self, titles: &[String]) -> RuntimeResult<Vec<TrackItem>> {
        self.runner
            .call("getResultsForTitles", vec![DynamicValue::from(titles.to_vec())])
            .await
    }

    pub async fn get_entry_form(&self, id: &str) -> RuntimeResult<EntryForm> {
        self.runner.call("getEntryForm", vec![id.into()]).await
    }

    /// Hand the submitted form values back to the tracker.
    pub async fn did_submit_entry_form(&self, id: &str, form: DynamicValue) -> RuntimeResult<()> {
        let _: DynamicValue = self
            .runner
            .call("didSubmitEntryForm", vec![id.into(), form])
            .await?;
        Ok(())
    }

    pub async fn did_update_last_read_chapter(
        &self,
        id: &str,
        progress: &TrackProgressUpdate,
    ) -> RuntimeResult<()> {
        self.runner
            .notify("didUpdateLastReadChapter", vec![id.into(), encode(progress)?])
            .await
    }

    pub async fn begin_tracking(&self, id: &str, status: TrackStatus) -> RuntimeResult<()> {
        self.runner
            .notify("beginTracking", vec![id.into(), encode(&status)?])
            .await
    }
}
