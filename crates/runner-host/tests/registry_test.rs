//! Integration tests for the runner registry.

use runner_host::{BridgeConfig, LoadedRunner, RunnerRegistry};
use runner_runtime::{ContextOptions, HostServices, RunnerKind, RunnerSources, RuntimeError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn registry() -> RunnerRegistry {
    RunnerRegistry::new(HostServices::default(), ContextOptions::default())
}

fn runner_script(id: &str) -> String {
    format!(
        r#"
const RunnerIntents = {{}};
var RunnerTarget = {{
  info: {{ id: "{id}", name: "Runner {id}", version: 2 }},
  getContent(id) {{ return {{ title: "Title " + id }}; }},
}};
"#
    )
}

fn source(id: &str) -> RunnerSources {
    RunnerSources::new(id, RunnerKind::Source, runner_script(id))
}

fn tracker(id: &str) -> RunnerSources {
    RunnerSources::new(id, RunnerKind::Tracker, runner_script(id))
}

#[tokio::test]
async fn test_concurrent_loads_share_one_runner() {
    let registry = registry();

    let (first, second) = tokio::join!(registry.load(source("dup")), registry.load(source("dup")));
    let first = first.unwrap();
    let second = second.unwrap();

    assert!(Arc::ptr_eq(first.runner(), second.runner()));
    assert_eq!(registry.count(), 1);
    assert_eq!(registry.ids(), vec!["dup".to_string()]);
}

#[tokio::test]
async fn test_loading_a_registered_id_returns_existing_runner() {
    let registry = registry();
    let first = registry.load(source("again")).await.unwrap();
    let second = registry.load(source("again")).await.unwrap();

    assert!(Arc::ptr_eq(first.runner(), second.runner()));
    assert_eq!(registry.count(), 1);
}

#[tokio::test]
async fn test_failed_load_is_not_registered() {
    let registry = registry();
    let broken = RunnerSources::new("broken", RunnerKind::Source, "throw new Error('boom');");

    let err = registry.load(broken).await.unwrap_err();
    assert!(matches!(err, RuntimeError::RunnerClassInitFailed(_)), "{err}");
    assert_eq!(registry.count(), 0);
    assert!(registry.get("broken").is_none());

    // A later load under the same id starts from scratch.
    registry.load(source("broken")).await.unwrap();
    assert!(registry.contains("broken"));
}

/// A runner whose evaluation spins for `millis` before finishing.
fn busy_script(id: &str, millis: u64, fail: bool) -> String {
    let tail = if fail {
        "throw new Error(\"late failure\");".to_string()
    } else {
        runner_script(id)
    };
    format!("const end = Date.now() + {millis};\nwhile (Date.now() < end) {{}}\n{tail}")
}

#[tokio::test]
async fn test_waiter_retries_after_failed_load() {
    let registry = registry();
    let slow = |millis, fail| {
        RunnerSources::new("race", RunnerKind::Source, busy_script("race", millis, fail))
    };

    let (first, second, third) = tokio::join!(
        registry.load(slow(200, true)),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            registry.load(slow(300, false)).await
        },
        async {
            tokio::time::sleep(Duration::from_millis(320)).await;
            registry.load(source("race")).await
        },
    );

    assert!(first.is_err());
    let second = second.unwrap();
    let third = third.unwrap();
    assert!(Arc::ptr_eq(second.runner(), third.runner()));

    let registered = registry.get("race").unwrap();
    assert!(Arc::ptr_eq(registered.runner(), second.runner()));
    assert!(!registered.runner().is_closed());
    assert_eq!(registry.count(), 1);
}

#[tokio::test]
async fn test_unload_racing_load_never_registers_closed_runner() {
    let registry = registry();

    for _ in 0..20 {
        let (loaded, _) = tokio::join!(registry.load(source("flip")), async {
            tokio::task::yield_now().await;
            let _ = registry.unload("flip");
        });

        match registry.get("flip") {
            Some(registered) => {
                assert!(!registered.runner().is_closed());
                assert!(Arc::ptr_eq(registered.runner(), loaded.unwrap().runner()));
            }
            None => match loaded {
                Ok(loaded) => assert!(loaded.runner().is_closed()),
                Err(err) => assert!(matches!(err, RuntimeError::ContextClosed(_)), "{err}"),
            },
        }
        registry.unload_all();
        assert_eq!(registry.count(), 0);
    }
}

#[tokio::test]
async fn test_declared_id_must_match() {
    let registry = registry();
    let sources = RunnerSources::new("expected", RunnerKind::Source, runner_script("other"));

    let err = registry.load(sources).await.unwrap_err();
    match err {
        RuntimeError::RunnerInfoInitFailed(message) => {
            assert!(message.contains("other"), "{message}");
            assert!(message.contains("expected"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn test_kind_lookup() {
    let registry = registry();
    registry.load(source("src")).await.unwrap();
    registry.load(tracker("trk")).await.unwrap();

    assert!(registry.source("src").is_ok());
    assert!(registry.tracker("trk").is_ok());
    assert!(matches!(
        registry.get("trk"),
        Some(LoadedRunner::Tracker(_))
    ));

    let err = registry.source("trk").unwrap_err();
    assert!(
        matches!(err, RuntimeError::RunnerKindMismatch { ref expected, .. } if expected == "source"),
        "{err}"
    );
    let err = registry.tracker("src").unwrap_err();
    assert!(matches!(err, RuntimeError::RunnerKindMismatch { .. }), "{err}");
    let err = registry.source("missing").unwrap_err();
    assert!(matches!(err, RuntimeError::RunnerNotFound(_)), "{err}");
}

#[tokio::test]
async fn test_list_summaries_sorted() {
    let registry = registry();
    registry.load(tracker("b-runner")).await.unwrap();
    registry.load(source("a-runner")).await.unwrap();

    let summaries = registry.list();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].id, "a-runner");
    assert_eq!(summaries[0].name, "Runner a-runner");
    assert_eq!(summaries[0].version, 2.0);
    assert_eq!(summaries[0].kind, RunnerKind::Source);
    assert_eq!(summaries[1].kind, RunnerKind::Tracker);
}

#[tokio::test]
async fn test_unload_destroys_context() {
    let registry = registry();
    let loaded = registry.load(source("gone")).await.unwrap();
    let runner = Arc::clone(loaded.runner());

    registry.unload("gone").unwrap();
    assert!(runner.is_closed());
    assert!(registry.get("gone").is_none());

    let err = registry.unload("gone").unwrap_err();
    assert!(matches!(err, RuntimeError::RunnerNotFound(_)), "{err}");

    let err = runner
        .call::<serde_json::Value>("getContent", vec!["1".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ContextClosed(_)), "{err}");
}

#[tokio::test]
async fn test_unload_all() {
    let registry = registry();
    let a = registry.load(source("a")).await.unwrap();
    let b = registry.load(tracker("b")).await.unwrap();

    registry.unload_all();
    assert_eq!(registry.count(), 0);
    assert!(a.runner().is_closed());
    assert!(b.runner().is_closed());
}

#[tokio::test]
async fn test_call_timeout_from_config() {
    let mut config = BridgeConfig::default();
    config.runtime.call_timeout_ms = Some(50);
    let registry = RunnerRegistry::from_config(&config, HostServices::default());

    let sources = RunnerSources::new(
        "slow",
        RunnerKind::Source,
        r#"
const RunnerIntents = {};
var RunnerTarget = {
  info: { id: "slow", name: "Slow", version: 1 },
  getContent(id) { return new Promise(() => {}); },
  getChapters(id) { return []; },
};
"#,
    );
    let content = registry.load(sources).await.unwrap();
    let LoadedRunner::Source(source) = content else {
        panic!("expected a source runner");
    };

    let err = source.get_content("1").await.unwrap_err();
    match err {
        RuntimeError::CallTimedOut { method, after } => {
            assert_eq!(method, "getContent");
            assert_eq!(after, Duration::from_millis(50));
        }
        other => panic!("unexpected error: {other}"),
    }

    // The context keeps serving calls after a timed out one.
    assert!(source.get_chapters("1").await.unwrap().is_empty());
}

fn write_runner(dir: &Path, id: &str, kind: &str) {
    let runner_dir = dir.join(id);
    std::fs::create_dir_all(&runner_dir).unwrap();
    std::fs::write(
        runner_dir.join("manifest.toml"),
        format!("capabilities = [\"log\"]\n\n[runner]\nid = \"{id}\"\nkind = \"{kind}\"\n"),
    )
    .unwrap();
    std::fs::write(runner_dir.join("runner.js"), runner_script(id)).unwrap();
}

#[tokio::test]
async fn test_discover_and_load_skips_failures() {
    let temp_dir = TempDir::new().unwrap();
    write_runner(temp_dir.path(), "disk-source", "source");
    write_runner(temp_dir.path(), "disk-tracker", "tracker");

    let bad_dir = temp_dir.path().join("disk-bad");
    std::fs::create_dir_all(&bad_dir).unwrap();
    std::fs::write(
        bad_dir.join("manifest.toml"),
        "[runner]\nid = \"disk-bad\"\nkind = \"source\"\n",
    )
    .unwrap();
    std::fs::write(bad_dir.join("runner.js"), "this is not javascript").unwrap();

    let registry = registry();
    let loaded = registry
        .discover_and_load(&[temp_dir.path().to_path_buf()])
        .await
        .unwrap();

    assert!(loaded.iter().any(|runner| runner.id() == "disk-source"));
    assert!(registry.source("disk-source").is_ok());
    assert!(registry.tracker("disk-tracker").is_ok());
    assert!(registry.get("disk-bad").is_none());
}
