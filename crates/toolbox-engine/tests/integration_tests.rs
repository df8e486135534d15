use std::{sync::Arc, time::Duration};

use config::{CONFIG_KEY, CaptureResult, MemoryStorage, SettingValue, Storage};
use tokio::{sync::mpsc, time};
use toolbox_engine::{
    DispatchPolicy, Engine, EngineParts, Error, KEEP_KEY, KeyEvent, KeyOutcome, Location, Module,
    NotifyKind, Trigger,
    test_support::{RecordingModule, TestEngine, test_engine, test_engine_with},
};

fn key(s: &str) -> KeyEvent {
    s.parse().unwrap()
}

fn modules(list: &[&Arc<RecordingModule>]) -> Vec<Arc<dyn Module>> {
    list.iter().map(|m| (*m).clone() as Arc<dyn Module>).collect()
}

#[tokio::test]
async fn dispatch_respects_scope() {
    let ws = RecordingModule::fire_once("ws", "w", &["/workspace/*"]);
    let TestEngine {
        engine, location, ..
    } = test_engine(modules(&[&ws]), "/workspace/gpt").unwrap();

    let out = engine.on_key_event(&key("w"));
    assert_eq!(out, KeyOutcome::Dispatched(vec![Trigger::Fired("ws".into())]));
    assert!(out.handled());

    for path in ["/workspace", "/workspace/sakura/x"] {
        location.navigate(path);
        assert!(engine.on_key_event(&key("W")).handled(), "{path}");
    }
    for path in ["/novel/syosetu/n1", "/workspaces", "/"] {
        location.navigate(path);
        assert_eq!(engine.on_key_event(&key("w")), KeyOutcome::Ignored, "{path}");
    }

    engine.settle().await;
    assert_eq!(ws.calls(), 3);
    assert_eq!(ws.automatic_flags(), vec![false; 3]);
}

#[tokio::test]
async fn dispatch_finds_binding_by_kind() {
    let m = RecordingModule::bound_under("hk", "hotkey", "j");
    let t = test_engine(modules(&[&m]), "/").unwrap();
    // A non-key setting named `bind` holding "x" is not a binding.
    assert_eq!(t.engine.on_key_event(&key("x")), KeyOutcome::Ignored);
    assert_eq!(
        t.engine.on_key_event(&key("j")),
        KeyOutcome::Dispatched(vec![Trigger::Fired("hk".into())])
    );
    assert_eq!(t.engine.settings("hk").unwrap().binding(), Some("j"));

    t.engine.update_setting("hk", "hotkey", "k".into()).unwrap();
    assert_eq!(t.engine.on_key_event(&key("j")), KeyOutcome::Ignored);
    assert!(t.engine.on_key_event(&key("k")).handled());
    t.engine.settle().await;
    assert_eq!(m.calls(), 2);
}

#[tokio::test]
async fn modifiers_suppress_dispatch() {
    let ws = RecordingModule::fire_once("ws", "w", &["/"]);
    let t = test_engine(modules(&[&ws]), "/").unwrap();
    for chord in ["ctrl+w", "alt+w", "meta+w"] {
        assert_eq!(t.engine.on_key_event(&key(chord)), KeyOutcome::Ignored);
    }
    assert!(t.engine.on_key_event(&key("shift+W")).handled());
    t.engine.settle().await;
    assert_eq!(ws.calls(), 1);
}

#[tokio::test]
async fn alt_t_toggles_ui_on_any_origin() {
    let ws = RecordingModule::fire_once("ws", "t", &["/"]);
    let t = test_engine(modules(&[&ws]), "/").unwrap();
    t.location.set(Location::new("https://example.com", "/elsewhere"));

    assert_eq!(
        t.engine.on_key_event(&key("alt+t")),
        KeyOutcome::UiToggled { visible: false }
    );
    assert_eq!(
        t.engine.on_key_event(&key("alt+T")),
        KeyOutcome::UiToggled { visible: true }
    );
    // The plain key is still subject to the origin check.
    assert_eq!(t.engine.on_key_event(&key("t")), KeyOutcome::Ignored);
    t.engine.settle().await;
    assert_eq!(ws.calls(), 0);
}

#[tokio::test]
async fn all_matching_modules_fire() {
    let a = RecordingModule::fire_once("a", "x", &["/"]);
    let b = RecordingModule::fire_once("b", "x", &["/novel"]);
    let c = RecordingModule::fire_once("c", "x", &["/wenku"]);
    let t = test_engine(modules(&[&a, &b, &c]), "/novel/kakuyomu/1").unwrap();
    assert_eq!(
        t.engine.on_key_event(&key("x")),
        KeyOutcome::Dispatched(vec![Trigger::Fired("a".into()), Trigger::Fired("b".into())])
    );
    t.engine.settle().await;
    assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 0));
}

#[tokio::test]
async fn continuous_toggle_round_trips() {
    let retry = RecordingModule::continuous("retry", "r", &["/workspace/*"]);
    let storage = Arc::new(MemoryStorage::new());
    storage.seed(KEEP_KEY, "{}");
    let t = test_engine_with(modules(&[&retry]), "/workspace/gpt", storage.clone()).unwrap();

    assert_eq!(
        t.engine.on_key_event(&key("r")),
        KeyOutcome::Dispatched(vec![Trigger::Toggled {
            module: "retry".into(),
            active: true
        }])
    );
    assert!(t.engine.is_active("retry"));
    assert_eq!(storage.get(KEEP_KEY).as_deref(), Some(r#"{"retry":true}"#));

    t.engine.on_key_event(&key("r"));
    assert!(!t.engine.is_active("retry"));
    assert_eq!(storage.get(KEEP_KEY).as_deref(), Some("{}"));
    // Toggling never runs the action itself.
    t.engine.settle().await;
    assert_eq!(retry.calls(), 0);
}

#[tokio::test]
async fn capture_records_next_key() {
    let ws = RecordingModule::fire_once("ws", "none", &["/"]);
    let t = test_engine(modules(&[&ws]), "/").unwrap();
    assert_eq!(t.engine.on_key_event(&key("k")), KeyOutcome::Ignored);

    t.engine.begin_capture("ws", "bind");
    match t.engine.on_key_event(&key("K")) {
        KeyOutcome::Captured(CaptureResult::Bound { key, .. }) => assert_eq!(key, "k"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!t.engine.is_capturing());
    assert_eq!(t.engine.settings("ws").unwrap().binding(), Some("k"));
    assert!(t.engine.on_key_event(&key("k")).handled());

    // Escape leaves the binding alone.
    t.engine.begin_capture("ws", "bind");
    assert!(matches!(
        t.engine.on_key_event(&key("Escape")),
        KeyOutcome::Captured(CaptureResult::Cancelled { .. })
    ));
    assert_eq!(t.engine.settings("ws").unwrap().binding(), Some("k"));

    // Backspace unbinds.
    t.engine.begin_capture("ws", "bind");
    t.engine.on_key_event(&key("Backspace"));
    assert_eq!(t.engine.settings("ws").unwrap().binding(), None);

    t.engine.settle().await;
    assert_eq!(ws.calls(), 1);
}

#[tokio::test]
async fn click_skips_key_but_checks_scope() {
    let ws = RecordingModule::fire_once("ws", "none", &["/workspace"]);
    let retry = RecordingModule::continuous("retry", "none", &["/workspace"]);
    let t = test_engine(modules(&[&ws, &retry]), "/workspace/gpt").unwrap();

    assert_eq!(t.engine.on_click("ws").unwrap(), Trigger::Fired("ws".into()));
    assert_eq!(
        t.engine.on_click("retry").unwrap(),
        Trigger::Toggled {
            module: "retry".into(),
            active: true
        }
    );
    assert!(matches!(t.engine.on_click("nope"), Err(Error::UnknownModule(_))));

    t.location.navigate("/novel");
    assert!(matches!(t.engine.on_click("ws"), Err(Error::OutOfScope { .. })));
    t.location.set(Location::new("https://example.com", "/workspace"));
    assert!(matches!(t.engine.on_click("ws"), Err(Error::OriginNotAllowed(_))));

    t.engine.settle().await;
    assert_eq!(ws.calls(), 1);
}

#[tokio::test]
async fn user_triggered_failure_is_notified() {
    let bad = RecordingModule::failing("bad", &["/"]);
    let mut t = test_engine(modules(&[&bad]), "/").unwrap();
    assert!(t.engine.invoke("bad").await.is_err());
    let n = t.notifications.try_recv().unwrap();
    assert_eq!(n.kind, NotifyKind::Error);
    assert!(n.message.contains("bad"));
}

#[tokio::test]
async fn nested_invocation_is_automatic() {
    let outer = RecordingModule::invoking("outer", "o", "inner");
    let inner = RecordingModule::fire_once("inner", "none", &["/elsewhere"]);
    let t = test_engine(modules(&[&outer, &inner]), "/").unwrap();
    t.engine.on_key_event(&key("o"));
    t.engine.settle().await;
    assert_eq!(outer.automatic_flags(), vec![false]);
    assert_eq!(inner.automatic_flags(), vec![true]);
}

#[tokio::test(start_paused = true)]
async fn scheduler_isolates_failures() {
    let bad = RecordingModule::failing("bad", &["/"]);
    let beat = RecordingModule::continuous("beat", "none", &["/"]);
    let idle = RecordingModule::continuous("idle", "none", &["/"]);
    let mut t = test_engine(modules(&[&bad, &beat, &idle]), "/").unwrap();
    t.engine.toggle_keep("bad").unwrap();
    t.engine.toggle_keep("beat").unwrap();

    t.engine.start();
    time::sleep(Duration::from_millis(350)).await;
    t.engine.settle().await;

    assert_eq!(t.engine.ticks(), 3);
    assert_eq!(bad.calls(), 3);
    assert_eq!(beat.calls(), 3);
    assert_eq!(idle.calls(), 0);
    assert!(beat.automatic_flags().iter().all(|a| *a));
    // Errors change neither the active state nor notify the user.
    assert!(t.engine.is_active("bad"));
    assert!(t.notifications.try_recv().is_err());

    t.engine.toggle_keep("beat").unwrap();
    time::sleep(Duration::from_millis(100)).await;
    t.engine.settle().await;
    assert_eq!(beat.calls(), 3);
    assert_eq!(bad.calls(), 4);

    t.engine.teardown().await;
    time::sleep(Duration::from_millis(500)).await;
    assert_eq!(bad.calls(), 4);
}

#[tokio::test]
async fn toggle_keep_rejects_fire_once() {
    let ws = RecordingModule::fire_once("ws", "w", &["/"]);
    let t = test_engine(modules(&[&ws]), "/").unwrap();
    assert!(matches!(t.engine.toggle_keep("ws"), Err(Error::NotContinuous(_))));
}

#[tokio::test]
async fn visible_modules_follow_page() {
    let ws = RecordingModule::fire_once("ws", "w", &["/workspace"]);
    let novel = RecordingModule::fire_once("novel", "n", &["/novel"]);
    let t = test_engine(modules(&[&ws, &novel]), "/workspace/gpt").unwrap();
    let ids: Vec<String> = t.engine.visible_modules().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["ws"]);

    t.location.set(Location::new("https://example.com", "/workspace/gpt"));
    assert!(t.engine.visible_modules().is_empty());
}

#[tokio::test]
async fn duplicate_ids_are_rejected() {
    let a = RecordingModule::fire_once("same", "a", &["/"]);
    let b = RecordingModule::fire_once("same", "b", &["/"]);
    assert!(matches!(
        test_engine(modules(&[&a, &b]), "/"),
        Err(Error::DuplicateModule(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn storage_changes_reload_state() {
    let ws = RecordingModule::fire_once("ws", "w", &["/"]);
    let retry = RecordingModule::continuous("retry", "none", &["/"]);
    let t = test_engine(modules(&[&ws, &retry]), "/").unwrap();
    t.engine.start();

    // Another instance rebinds `ws` and activates `retry`.
    let (tx, _rx) = mpsc::unbounded_channel();
    let other = Engine::initialize(EngineParts {
        storage: t.storage.clone(),
        modules: modules(&[&ws, &retry]),
        location: Arc::new(t.location.clone()),
        notifications: tx,
        policy: DispatchPolicy::default(),
    })
    .unwrap();
    other.update_setting("ws", "bind", SettingValue::from("z")).unwrap();
    other.toggle_keep("retry").unwrap();

    time::sleep(Duration::from_millis(10)).await;
    assert_eq!(t.engine.settings("ws").unwrap().binding(), Some("z"));
    assert!(t.engine.is_active("retry"));
    assert!(t.storage.get(CONFIG_KEY).is_some());
    t.engine.teardown().await;
}
