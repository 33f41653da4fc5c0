//! End-to-end view scenarios through the public API.
//!
//! Flush timing is driven by a `ManualScheduler` so every window boundary
//! is explicit; one test at the bottom runs the default tokio timer under
//! a paused clock instead.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use vantage_core::{
    open_view, open_view_with_scheduler, DeliveryMode, FlushScheduler, ManualScheduler,
    MemTransport, ObjectKey, RawObject, SourceId, Transport, ViewConfig, ViewError, ViewHandle,
    Watchable,
};

const WINDOW: Duration = Duration::from_millis(100);

struct Fixture {
    transport: Arc<MemTransport>,
    scheduler: Arc<ManualScheduler>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            transport: Arc::new(MemTransport::new()),
            scheduler: Arc::new(ManualScheduler::new()),
        }
    }

    fn open(&self, spec: impl Into<vantage_core::SourceSpec>, config: ViewConfig) -> ViewHandle {
        open_view_with_scheduler(
            Arc::clone(&self.transport) as Arc<dyn Transport>,
            spec,
            config,
            Arc::clone(&self.scheduler) as Arc<dyn FlushScheduler>,
        )
        .expect("view should open")
    }

    fn publish(&self, source: &str, key: &str, value: serde_json::Value) {
        self.transport.publish(
            &SourceId::from(source),
            RawObject {
                key: key.into(),
                deleted: false,
                value: Some(value),
            },
        );
    }

    fn tombstone(&self, source: &str, key: &str) {
        self.transport.publish(
            &SourceId::from(source),
            RawObject {
                key: key.into(),
                deleted: true,
                value: None,
            },
        );
    }

    fn flush(&self) {
        self.scheduler.advance(WINDOW);
    }
}

/// Lets spawned pull drain tasks catch up.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

// --- Coalescing ---

#[tokio::test]
async fn add_then_delete_in_one_window_leaves_view_empty() {
    let fx = Fixture::new();
    let view = fx.open("a", ViewConfig::default());

    fx.publish("a", "1", json!("x"));
    fx.tombstone("a", "1");
    fx.flush();

    assert!(view.values().is_empty());
}

#[tokio::test]
async fn delete_then_re_add_in_one_window_results_in_add() {
    let fx = Fixture::new();
    let view = fx.open("a", ViewConfig::default());

    fx.publish("a", "1", json!("old"));
    fx.flush();
    assert_eq!(view.values(), vec![json!("old")]);

    fx.tombstone("a", "1");
    fx.publish("a", "1", json!("new"));
    fx.flush();
    assert_eq!(view.values(), vec![json!("new")]);
}

#[tokio::test]
async fn burst_on_one_key_keeps_only_last_value() {
    let fx = Fixture::new();
    let view = fx.open("a", ViewConfig::default());

    for i in 0..10 {
        fx.publish("a", "k", json!(i));
    }
    fx.flush();

    assert_eq!(view.values(), vec![json!(9)]);
    assert_eq!(view.metrics().flushes, 1);
}

#[tokio::test]
async fn deleting_an_absent_key_is_a_noop() {
    let fx = Fixture::new();
    let view = fx.open("a", ViewConfig::default());

    fx.tombstone("a", "never-existed");
    fx.flush();

    assert!(view.is_empty());
}

// --- Multiple sources ---

#[tokio::test]
async fn events_from_all_sources_merge_into_one_view() {
    let fx = Fixture::new();
    let view = fx.open(vec!["a", "b"], ViewConfig::default());

    fx.publish("a", "1", json!("x"));
    fx.publish("b", "2", json!("y"));
    fx.flush();

    let mut values = view.values();
    values.sort_by_key(|v| v.to_string());
    assert_eq!(values, vec![json!("x"), json!("y")]);
    assert_eq!(view.get(&ObjectKey::from("1")), Some(json!("x")));
    assert_eq!(view.get(&ObjectKey::from("2")), Some(json!("y")));
}

// --- Source-set changes ---

#[tokio::test]
async fn growing_the_source_set_keeps_old_sessions_and_resets_store() {
    let fx = Fixture::new();
    let sources = Watchable::new(vec![SourceId::from("a")]);
    let view = fx.open(sources.clone(), ViewConfig::default());

    fx.publish("a", "1", json!("before"));
    fx.flush();
    assert_eq!(view.len(), 1);

    sources.set(vec!["a".into(), "b".into()]);

    // "a" kept its single registration; the store was cleared.
    assert_eq!(fx.transport.open_count(&"a".into()), 1);
    assert_eq!(fx.transport.open_count(&"b".into()), 1);
    assert!(view.is_empty());

    fx.publish("a", "1", json!("after"));
    fx.publish("b", "2", json!("fresh"));
    fx.flush();
    assert_eq!(view.len(), 2);
}

#[tokio::test]
async fn content_equal_list_instance_causes_no_churn() {
    let fx = Fixture::new();
    let sources = Watchable::new(vec![SourceId::from("a")]);
    let view = fx.open(sources.clone(), ViewConfig::default());

    fx.publish("a", "1", json!("kept"));
    fx.flush();

    // New Vec instance, identical content.
    sources.set(vec![SourceId::from("a")]);

    assert_eq!(fx.transport.open_count(&"a".into()), 1);
    assert_eq!(view.values(), vec![json!("kept")]);
    assert_eq!(view.metrics().resets, 0);
}

#[tokio::test]
async fn removed_source_leaves_no_stale_entries() {
    let fx = Fixture::new();
    let sources = Watchable::new(vec![SourceId::from("a"), "b".into()]);
    let view = fx.open(sources.clone(), ViewConfig::default());

    fx.publish("a", "1", json!("from-a"));
    fx.publish("b", "2", json!("from-b"));
    fx.flush();
    assert_eq!(view.len(), 2);

    sources.set(vec!["b".into()]);
    assert!(view.is_empty());

    // Only "b" can repopulate the view now.
    fx.publish("a", "1", json!("stale"));
    fx.publish("b", "2", json!("current"));
    fx.flush();
    assert_eq!(view.values(), vec![json!("current")]);
}

#[tokio::test]
async fn element_cell_change_rebinds_the_session() {
    let fx = Fixture::new();
    let element = Watchable::new(SourceId::from("old"));
    let view = fx.open(element.clone(), ViewConfig::default());

    fx.publish("old", "1", json!("old-data"));
    fx.flush();
    assert_eq!(view.len(), 1);

    element.set("new".into());
    assert!(view.is_empty());
    assert_eq!(fx.transport.push_registrations(&"old".into()), 0);
    assert_eq!(fx.transport.push_registrations(&"new".into()), 1);
}

#[tokio::test]
async fn session_open_failure_during_change_is_surfaced() {
    let fx = Fixture::new();
    let sources = Watchable::new(vec![SourceId::from("a")]);
    let view = fx.open(sources.clone(), ViewConfig::default());
    assert!(view.error().is_none());

    fx.transport.set_fail_subscribe(true);
    sources.set(vec!["a".into(), "b".into()]);

    assert!(matches!(view.error(), Some(ViewError::SessionOpen { .. })));

    // The surviving source still updates the view.
    fx.publish("a", "1", json!("alive"));
    fx.flush();
    assert_eq!(view.values(), vec![json!("alive")]);
}

#[tokio::test]
async fn initial_open_failure_returns_error() {
    let fx = Fixture::new();
    fx.transport.set_fail_subscribe(true);

    let result = open_view_with_scheduler(
        Arc::clone(&fx.transport) as Arc<dyn Transport>,
        "a",
        ViewConfig::default(),
        Arc::clone(&fx.scheduler) as Arc<dyn FlushScheduler>,
    );
    assert!(matches!(result, Err(ViewError::SessionOpen { .. })));
    assert_eq!(fx.transport.push_registrations(&"a".into()), 0);
}

// --- Disposal ---

#[tokio::test]
async fn dispose_with_pending_batch_never_flushes() {
    let fx = Fixture::new();
    let view = fx.open("a", ViewConfig::default());

    fx.publish("a", "1", json!("flushed"));
    fx.flush();

    fx.publish("a", "2", json!("pending"));
    view.dispose();

    fx.scheduler.advance(Duration::from_secs(60));
    assert_eq!(view.values(), vec![json!("flushed")]);
}

#[tokio::test]
async fn events_after_dispose_never_mutate_the_view() {
    let fx = Fixture::new();
    let view = fx.open("a", ViewConfig::default());

    fx.publish("a", "1", json!("kept"));
    fx.flush();
    view.dispose();

    fx.publish("a", "2", json!("late"));
    fx.flush();

    assert_eq!(view.values(), vec![json!("kept")]);
    assert!(view.is_disposed());
    assert_eq!(fx.transport.push_registrations(&"a".into()), 0);
}

#[tokio::test]
async fn double_dispose_is_a_noop() {
    let fx = Fixture::new();
    let view = fx.open("a", ViewConfig::default());

    view.dispose();
    view.dispose();
    assert!(view.is_disposed());
}

#[tokio::test]
async fn source_changes_after_dispose_do_nothing() {
    let fx = Fixture::new();
    let sources = Watchable::new(vec![SourceId::from("a")]);
    let view = fx.open(sources.clone(), ViewConfig::default());

    view.dispose();
    sources.set(vec!["b".into()]);

    assert_eq!(fx.transport.open_count(&"b".into()), 0);
}

// --- Pull delivery ---

#[tokio::test]
async fn pull_mode_materializes_like_push() {
    let fx = Fixture::new();
    let view = fx.open(
        vec!["a", "b"],
        ViewConfig::default().with_delivery(DeliveryMode::Pull),
    );
    settle().await;

    fx.publish("a", "1", json!("x"));
    fx.publish("b", "2", json!("y"));
    settle().await;
    fx.flush();

    assert_eq!(view.len(), 2);
}

#[tokio::test]
async fn pull_mode_dispose_cancels_streams() {
    let fx = Fixture::new();
    let view = fx.open(
        "a",
        ViewConfig::default().with_delivery(DeliveryMode::Pull),
    );
    settle().await;
    assert_eq!(fx.transport.pull_streams(&"a".into()), 1);

    view.dispose();
    settle().await;

    fx.publish("a", "1", json!("late"));
    settle().await;
    fx.scheduler.advance(Duration::from_secs(1));
    assert!(view.is_empty());
}

#[tokio::test]
async fn pull_mode_survives_one_stream_drop() {
    let fx = Fixture::new();
    let view = fx.open(
        "a",
        ViewConfig::default().with_delivery(DeliveryMode::Pull),
    );
    settle().await;

    fx.transport.end_pull(&"a".into());
    settle().await;
    assert_eq!(fx.transport.open_count(&"a".into()), 2);

    fx.publish("a", "1", json!("recovered"));
    settle().await;
    fx.flush();
    assert_eq!(view.values(), vec![json!("recovered")]);
}

// --- Default tokio timer ---

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn default_timer_flushes_on_the_configured_interval() {
    let transport = Arc::new(MemTransport::new());
    let view = open_view(
        Arc::clone(&transport) as Arc<dyn Transport>,
        "a",
        ViewConfig::default().with_flush_interval(Duration::from_millis(100)),
    )
    .expect("view should open");

    transport.publish(
        &"a".into(),
        RawObject {
            key: "1".into(),
            deleted: false,
            value: Some(json!("timed")),
        },
    );

    // Still within the window: nothing applied yet.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(view.is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(view.values(), vec![json!("timed")]);
}
