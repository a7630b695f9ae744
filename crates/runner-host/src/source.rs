//! Content source runners.
//!
//! A source runner serves catalog data: details, chapter lists, chapter
//! payloads and directory listings. Several of its methods belong to
//! optional capabilities and are gated on the runner's intents.

use crate::models::{
    Chapter, ChapterData, Content, DirectoryConfig, DirectoryRequest, PageLink, PageSection,
    PagedResult,
};
use crate::runner::Runner;
use parking_lot::Mutex;
use runner_runtime::{encode, DynamicValue, NetworkRequest, RunnerKind, RuntimeError, RuntimeResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Typed front for a runner of kind `source`.
pub struct ContentSource {
    runner: Arc<Runner>,
    directory_configs: Mutex<HashMap<String, DirectoryConfig>>,
}

impl ContentSource {
    /// Wrap a loaded runner. Fails if the runner is not a source.
    pub fn new(runner: Arc<Runner>) -> RuntimeResult<Self> {
        if runner.kind() != RunnerKind::Source {
            return Err(RuntimeError::RunnerKindMismatch {
                id: runner.id().to_string(),
                expected: RunnerKind::Source.to_string(),
            });
        }
        Ok(Self {
            runner,
            directory_configs: Mutex::new(HashMap::new()),
        })
    }

    pub fn runner(&self) -> &Arc<Runner> {
        &self.runner
    }

    pub fn id(&self) -> &str {
        self.runner.id()
    }

    pub async fn get_content(&self, id: &str) -> RuntimeResult<Content> {
        self.runner.call("getContent", vec![id.into()]).await
    }

    pub async fn get_chapters(&self, id: &str) -> RuntimeResult<Vec<Chapter>> {
        self.runner.call("getChapters", vec![id.into()]).await
    }

    pub async fn get_chapter_data(
        &self,
        content_id: &str,
        chapter_id: &str,
    ) -> RuntimeResult<ChapterData> {
        self.runner
            .call("getChapterData", vec![content_id.into(), chapter_id.into()])
            .await
    }

    pub async fn get_directory(&self, request: &DirectoryRequest) -> RuntimeResult<PagedResult> {
        self.runner
            .call("getDirectory", vec![encode(request)?])
            .await
    }

    /// Directory options for `key`; cached for the lifetime of the handle.
    pub async fn get_directory_config(&self, key: Option<&str>) -> RuntimeResult<DirectoryConfig> {
        let cache_key = key.unwrap_or_default().to_string();
        if let Some(config) = self.directory_configs.lock().get(&cache_key) {
            debug!(runner = %self.id(), key = %cache_key, "Directory config cache hit");
            return Ok(config.clone());
        }

        let config: DirectoryConfig = self
            .runner
            .call("getDirectoryConfig", vec![DynamicValue::from(key)])
            .await?;
        self.directory_configs
            .lock()
            .insert(cache_key, config.clone());
        Ok(config)
    }

    pub fn clear_directory_cache(&self) {
        self.directory_configs.lock().clear();
    }

    pub async fn get_sections_for_page(&self, link: &PageLink) -> RuntimeResult<Vec<PageSection>> {
        self.runner
            .call_gated(
                "getSectionsForPage",
                self.runner.intents().page_link_resolver,
                vec![encode(link)?],
            )
            .await
    }

    /// Let the runner decorate an image request (headers, referer).
    pub async fn will_request_image(&self, url: &str) -> RuntimeResult<NetworkRequest> {
        self.runner
            .call_gated(
                "willRequestImage",
                self.runner.intents().image_request_handler,
                vec![url.into()],
            )
            .await
    }

    pub async fn on_chapter_read(&self, content_id: &str, chapter_id: &str) -> RuntimeResult<()> {
        self.runner
            .notify_gated(
                "onChapterRead",
                self.runner.intents().chapter_event_handler,
                vec![content_id.into(), chapter_id.into()],
            )
            .await
    }

    pub async fn on_content_opened(&self, id: &str) -> RuntimeResult<()> {
        self.runner
            .notify_gated(
                "onContentOpened",
                self.runner.intents().content_event_handler,
                vec![id.into()],
            )
            .await
    }
}

impl std::fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentSource")
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}
