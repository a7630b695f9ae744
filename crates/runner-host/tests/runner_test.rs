//! Integration tests for runner handles and the source/tracker fronts.

use runner_host::models::{DirectoryRequest, PageLink, TrackProgressUpdate, TrackStatus};
use runner_host::{ContentSource, ContentTracker, Runner};
use runner_runtime::{
    ContextOptions, DynamicValue, HostServices, MemoryStore, ReqwestTransport, RunnerKind,
    RunnerSources, RuntimeError, StoreBackend,
};
use std::sync::Arc;

async fn load(kind: RunnerKind, id: &str, main: &str) -> Arc<Runner> {
    let sources = RunnerSources::new(id, kind, main);
    Arc::new(
        Runner::load(sources, HostServices::default(), ContextOptions::default())
            .await
            .unwrap(),
    )
}

const GATED_SOURCE: &str = r#"
const RunnerIntents = { chapterEventHandler: false, contentEventHandler: true };

class GatedSource {
  constructor() {
    this.info = { id: "gated", name: "Gated", version: 1 };
    this.configCalls = 0;
  }

  getSectionsForPage(link) {
    return [{ id: "never", title: "Never reached" }];
  }

  onChapterRead(contentId, chapterId) {
    throw new Error("should be skipped");
  }

  onContentOpened(id) {
    throw { name: "Opened", message: id };
  }

  getDirectoryConfig(key) {
    this.configCalls += 1;
    return { filters: [], sort: this.configCalls };
  }

  getDirectory(request) {
    return {
      results: [{ id: request.configID + ":" + request.page, title: request.query }],
      isLastPage: true,
    };
  }
}

var RunnerTarget = GatedSource;
"#;

#[tokio::test]
async fn test_undeclared_capability_is_not_implemented() {
    let source = ContentSource::new(load(RunnerKind::Source, "gated", GATED_SOURCE).await).unwrap();
    let link = PageLink {
        id: "home".to_string(),
        context: None,
    };

    let err = source.get_sections_for_page(&link).await.unwrap_err();
    assert!(matches!(err, RuntimeError::MethodNotImplemented(ref m) if m == "getSectionsForPage"), "{err}");

    let err = source.will_request_image("https://img").await.unwrap_err();
    assert!(matches!(err, RuntimeError::MethodNotImplemented(_)), "{err}");
}

#[tokio::test]
async fn test_optional_hooks_follow_intents() {
    let source = ContentSource::new(load(RunnerKind::Source, "gated", GATED_SOURCE).await).unwrap();

    // Undeclared: never delivered, so the throwing body is not reached.
    source.on_chapter_read("c", "1").await.unwrap();

    // Declared: delivered, and a throw surfaces.
    let err = source.on_content_opened("c").await.unwrap_err();
    assert_eq!(err.to_string(), "[Opened] c");
}

#[tokio::test]
async fn test_directory_config_is_cached_per_key() {
    let source = ContentSource::new(load(RunnerKind::Source, "gated", GATED_SOURCE).await).unwrap();

    let first = source.get_directory_config(Some("popular")).await.unwrap();
    let again = source.get_directory_config(Some("popular")).await.unwrap();
    assert_eq!(first.sort, Some(DynamicValue::Number(1.0)));
    assert_eq!(again.sort, Some(DynamicValue::Number(1.0)));

    let other = source.get_directory_config(None).await.unwrap();
    assert_eq!(other.sort, Some(DynamicValue::Number(2.0)));

    source.clear_directory_cache();
    let refreshed = source.get_directory_config(Some("popular")).await.unwrap();
    assert_eq!(refreshed.sort, Some(DynamicValue::Number(3.0)));
}

#[tokio::test]
async fn test_directory_request_reaches_runner() {
    let source = ContentSource::new(load(RunnerKind::Source, "gated", GATED_SOURCE).await).unwrap();
    let request = DirectoryRequest {
        query: Some("dragons".to_string()),
        page: 3,
        config_id: Some("latest".to_string()),
        ..Default::default()
    };

    let result = source.get_directory(&request).await.unwrap();
    assert!(result.is_last_page);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].id, "latest:3");
    assert_eq!(result.results[0].title, "dragons");
}

const RESOLVING_SOURCE: &str = r#"
const RunnerIntents = { pageLinkResolver: true, imageRequestHandler: true };

var RunnerTarget = {
  info: { id: "resolver", name: "Resolver", version: 1.5 },

  async getContent(id) {
    return { title: "Content " + id, status: "ONGOING", isNsfw: false };
  },

  getChapters(id) {
    return [
      { chapterId: id + "-1", number: 1, index: 0 },
      { chapterId: id + "-2", number: 2, index: 1, title: "Second" },
    ];
  },

  getChapterData(contentId, chapterId) {
    return { pages: [{ url: "https://img/" + contentId + "/" + chapterId + "/1" }] };
  },

  getSectionsForPage(link) {
    return [{ id: link.id, title: "Section for " + link.id }];
  },
};
"#;

#[tokio::test]
async fn test_source_calls_decode() {
    let source =
        ContentSource::new(load(RunnerKind::Source, "resolver", RESOLVING_SOURCE).await).unwrap();

    let content = source.get_content("7").await.unwrap();
    assert_eq!(content.title, "Content 7");

    let chapters = source.get_chapters("7").await.unwrap();
    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[1].title.as_deref(), Some("Second"));

    let runner = source.runner();
    assert!(runner.has_method("getChapterData").await.unwrap());
    assert!(!runner.has_method("willRequestImage").await.unwrap());
    let raw = runner
        .call::<DynamicValue>("getContent", vec!["8".into()])
        .await
        .unwrap();
    assert_eq!(raw.get("title").and_then(|v| v.as_str()), Some("Content 8"));

    let data = source.get_chapter_data("7", "7-1").await.unwrap();
    let pages = data.pages.unwrap();
    assert_eq!(pages[0].url, "https://img/7/7-1/1");

    let sections = source
        .get_sections_for_page(&PageLink {
            id: "home".to_string(),
            context: None,
        })
        .await
        .unwrap();
    assert_eq!(sections[0].title, "Section for home");
}

#[tokio::test]
async fn test_declared_but_missing_method_is_not_implemented() {
    let source =
        ContentSource::new(load(RunnerKind::Source, "resolver", RESOLVING_SOURCE).await).unwrap();

    let err = source.will_request_image("https://img").await.unwrap_err();
    assert!(matches!(err, RuntimeError::MethodNotImplemented(ref m) if m == "willRequestImage"), "{err}");
}

#[tokio::test]
async fn test_source_rejects_tracker_runner() {
    let runner = load(RunnerKind::Tracker, "resolver", RESOLVING_SOURCE).await;
    let err = ContentSource::new(runner).unwrap_err();
    assert!(matches!(err, RuntimeError::RunnerKindMismatch { .. }), "{err}");
}

const TRACKER: &str = r#"
const RunnerIntents = { isAuthenticatable: true, authenticationMethod: "basic", basicAuthLabel: "email" };

class Tracker {
  constructor() {
    this.info = { id: "tracker", name: "Tracker", version: 1 };
  }

  async getTrackItem(id) {
    const stored = RunnerStore.get("progress:" + id);
    return {
      id,
      title: "Tracked " + id,
      entry: stored === null ? undefined : JSON.parse(stored),
    };
  }

  getResultsForTitles(titles) {
    return titles.map((title, i) => ({ id: String(i), title }));
  }

  getEntryForm(id) {
    throw { name: "Oops", message: "bad id" };
  }

  didSubmitEntryForm(id, form) {
    RunnerStore.set("form:" + id, JSON.stringify(form));
  }

  beginTracking(id, status) {
    RunnerStore.set(
      "progress:" + id,
      JSON.stringify({ status, progress: { lastReadChapter: 0 } })
    );
  }

  getAuthenticatedUser() {
    const handle = RunnerStore.get("user");
    return handle === null ? null : { handle };
  }

  handleBasicAuth(identifier, password) {
    if (password !== "hunter2") {
      throw { name: "AuthError", message: "wrong password" };
    }
    RunnerStore.set("user", identifier);
  }
}

var RunnerTarget = Tracker;
"#;

fn tracker_services() -> (HostServices, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let services = HostServices::new(Arc::new(ReqwestTransport::new()), store.clone());
    (services, store)
}

async fn load_tracker(services: HostServices) -> ContentTracker {
    let sources = RunnerSources::new("tracker", RunnerKind::Tracker, TRACKER);
    let runner = Runner::load(sources, services, ContextOptions::default())
        .await
        .unwrap();
    ContentTracker::new(Arc::new(runner)).unwrap()
}

#[tokio::test]
async fn test_tracker_flow() {
    let (services, store) = tracker_services();
    let tracker = load_tracker(services).await;

    let item = tracker.get_track_item("42").await.unwrap();
    assert_eq!(item.title, "Tracked 42");
    assert!(item.entry.is_none());

    tracker
        .begin_tracking("42", TrackStatus::Planned)
        .await
        .unwrap();
    let item = tracker.get_track_item("42").await.unwrap();
    assert_eq!(item.entry.unwrap().status, TrackStatus::Planned);

    let results = tracker
        .get_results_for_titles(&["One".to_string(), "Two".to_string()])
        .await
        .unwrap();
    assert_eq!(results[1].title, "Two");

    tracker
        .did_submit_entry_form("42", DynamicValue::map([("score", 9.0)]))
        .await
        .unwrap();
    assert_eq!(
        store.get("tracker::form:42").unwrap().as_deref(),
        Some("{\"score\":9}")
    );

    // Not implemented by the runner: optional hook, no error.
    tracker
        .did_update_last_read_chapter(
            "42",
            &TrackProgressUpdate {
                chapter: Some(3.0),
                volume: None,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_tracker_entry_form_error_message() {
    let (services, _) = tracker_services();
    let tracker = load_tracker(services).await;

    let err = tracker.get_entry_form("x").await.unwrap_err();
    assert_eq!(err.to_string(), "[Oops] bad id");
}

#[tokio::test]
async fn test_basic_auth_round() {
    let (services, _) = tracker_services();
    let tracker = load_tracker(services).await;
    let runner = tracker.runner();

    assert!(runner.intents().uses_basic_auth());
    assert!(runner.get_authenticated_user().await.unwrap().is_none());

    let err = runner
        .handle_basic_auth("me@example.com", "nope")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "[AuthError] wrong password");

    runner
        .handle_basic_auth("me@example.com", "hunter2")
        .await
        .unwrap();
    let user = runner.get_authenticated_user().await.unwrap().unwrap();
    assert_eq!(user.handle, "me@example.com");

    // Declared but not implemented by the runner.
    runner.handle_user_sign_out().await.unwrap();
}

#[tokio::test]
async fn test_auth_requires_intent() {
    let source =
        ContentSource::new(load(RunnerKind::Source, "resolver", RESOLVING_SOURCE).await).unwrap();
    let runner = source.runner();

    let err = runner.get_authenticated_user().await.unwrap_err();
    assert!(matches!(err, RuntimeError::MethodNotImplemented(_)), "{err}");
    let err = runner.handle_basic_auth("a", "b").await.unwrap_err();
    assert!(matches!(err, RuntimeError::MethodNotImplemented(_)), "{err}");
}

#[tokio::test]
async fn test_descriptor_failure_destroys_context() {
    let sources = RunnerSources::new(
        "no-intents",
        RunnerKind::Source,
        r#"var RunnerTarget = { info: { id: "no-intents", name: "N", version: 1 } };"#,
    );
    let err = Runner::load(sources, HostServices::default(), ContextOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::FailedToParseRunnerIntents(_)), "{err}");
}
