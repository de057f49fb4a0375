use darkmode::{
    DarkModeEngine, EngineConfig, KeyValueStore, OriginStorage, RenderState, SettingsPatch,
    SharedStorage,
};
use dom::{Document, LayoutRect, NodeKey, ReadyState, SharedDocument};
use serde_json::json;
use std::rc::Rc;
use std::sync::Arc;
use tokio::time::{Duration, Instant, sleep};

const ORIGIN: &str = "https://example.com";

fn page(host: &str, root_style: &str, body_style: &str) -> SharedDocument {
    let mut document = Document::new(host);
    let root = document.document_element().unwrap();
    let body = document.body().unwrap();
    document.set_style_text(root, root_style).unwrap();
    document.set_style_text(body, body_style).unwrap();
    let para = document.create_element("p");
    document.append_child(body, para).unwrap();
    document.set_text_content(para, "An ordinary article.").unwrap();
    document.set_ready_state(ReadyState::Interactive);
    document.into_shared()
}

fn light_page(host: &str) -> SharedDocument {
    page(host, "background-color: #ffffff", "color: #202020")
}

fn dark_page(host: &str) -> SharedDocument {
    page(host, "background-color: #121212", "background: rgb(18, 18, 18); color: #eeeeee")
}

fn engine_for(document: &SharedDocument, store: OriginStorage) -> DarkModeEngine {
    DarkModeEngine::new(Rc::clone(document), EngineConfig::default(), Box::new(store))
}

fn enabled_store(host: &str) -> OriginStorage {
    let store = OriginStorage::in_memory(ORIGIN);
    store
        .set(&format!("darkmode-pro_state_{host}"), &json!({"enabled": true}).to_string())
        .unwrap();
    store
}

fn find(document: &SharedDocument, id: &str) -> Option<NodeKey> {
    let document = document.borrow();
    document.element_by_id(document.document_node(), id)
}

fn marker(document: &SharedDocument) -> Option<String> {
    let document = document.borrow();
    let root = document.document_element().unwrap();
    document.attribute(root, "data-darkmode-pro").map(str::to_owned)
}

fn has_pending_guard(document: &SharedDocument) -> bool {
    let shared = document.borrow();
    let root = shared.document_element().unwrap();
    shared.has_class(root, "darkmode-pro-pending")
        || find(document, "darkmode-pro-pending").is_some()
}

#[tokio::test(start_paused = true)]
async fn white_page_resolves_to_inverted_rendering() {
    let _ = env_logger::builder().is_test(true).try_init();
    let document = light_page("example.com");
    let engine = engine_for(&document, OriginStorage::in_memory(ORIGIN));

    engine.enable().await;

    assert_eq!(engine.state(), RenderState::ResolvedOn);
    assert!(engine.is_resolved());
    assert_eq!(marker(&document).as_deref(), Some("on"));
    assert!(!has_pending_guard(&document));
    let mask = find(&document, "darkmode-pro-mask").unwrap();
    let mask_style = document.borrow().attribute(mask, "style").unwrap().to_owned();
    assert!(mask_style.contains("rgba(0,0,0,0.08)"));
    let root = document.borrow().document_element().unwrap();
    let filter = document.borrow().computed_style(root).unwrap().filter;
    assert!(filter.starts_with("invert(1) hue-rotate(180deg)"));
    assert!(engine.is_enhancing());
}

#[tokio::test(start_paused = true)]
async fn dark_page_is_left_alone_but_media_is_protected() {
    let _ = env_logger::builder().is_test(true).try_init();
    let document = dark_page("example.com");
    let img = {
        let mut shared = document.borrow_mut();
        let body = shared.body().unwrap();
        let img = shared.create_element("img");
        shared.append_child(body, img).unwrap();
        img
    };
    let engine = engine_for(&document, OriginStorage::in_memory(ORIGIN));

    engine.enable().await;

    assert_eq!(engine.state(), RenderState::ResolvedAlreadyDark);
    assert_eq!(marker(&document).as_deref(), Some("already-dark"));
    assert_eq!(document.borrow().computed_style(img).unwrap().filter, "none");
    let root = document.borrow().document_element().unwrap();
    assert_eq!(document.borrow().computed_style(root).unwrap().filter, "none");
    assert!(!engine.is_enhancing());
}

#[tokio::test(start_paused = true)]
async fn concurrent_resolves_share_one_decision() {
    let _ = env_logger::builder().is_test(true).try_init();
    let document = light_page("example.com");
    let engine = engine_for(&document, enabled_store("example.com"));
    engine.bootstrap();
    assert_eq!(engine.state(), RenderState::Pending);
    assert!(has_pending_guard(&document));

    let (first, second) = futures::join!(engine.resolve(), engine.resolve());

    assert_eq!(first, RenderState::ResolvedOn);
    assert_eq!(second, RenderState::ResolvedOn);
    let stats = engine.stats();
    assert_eq!(stats.heuristic_runs, 1);
    assert_eq!(stats.renders, 1);
    assert!(!has_pending_guard(&document));
}

#[tokio::test(start_paused = true)]
async fn resolved_state_is_locked_until_disabled() {
    let _ = env_logger::builder().is_test(true).try_init();
    let document = light_page("example.com");
    let engine = engine_for(&document, enabled_store("example.com"));
    engine.bootstrap();
    assert_eq!(engine.resolve().await, RenderState::ResolvedOn);

    {
        let mut shared = document.borrow_mut();
        let root = shared.document_element().unwrap();
        let body = shared.body().unwrap();
        shared.set_style_text(root, "background-color: #000").unwrap();
        shared.set_style_text(body, "background: #000; color: #fff").unwrap();
    }
    assert_eq!(engine.resolve().await, RenderState::ResolvedOn);
    assert_eq!(marker(&document).as_deref(), Some("on"));

    engine.disable();
    assert_eq!(engine.state(), RenderState::Disabled);
    engine.enable().await;
    assert_eq!(engine.state(), RenderState::ResolvedAlreadyDark);
}

#[tokio::test(start_paused = true)]
async fn fresh_dark_scheme_document_stays_unguarded() {
    let _ = env_logger::builder().is_test(true).try_init();
    let document = light_page("example.com");
    document.borrow_mut().set_prefers_dark_scheme(true);
    let engine = engine_for(&document, OriginStorage::in_memory(ORIGIN));

    engine.bootstrap();

    assert_eq!(engine.state(), RenderState::Disabled);
    assert!(!has_pending_guard(&document));
    let snapshot = engine.snapshot();
    assert!(!snapshot.enabled);
    assert_eq!(
        (snapshot.brightness, snapshot.contrast, snapshot.sepia, snapshot.grayscale),
        (92, 95, 12, 0)
    );
    assert_eq!(engine.resolve().await, RenderState::Disabled);
    assert_eq!(engine.stats().heuristic_runs, 0);
}

#[tokio::test(start_paused = true)]
async fn dominant_video_suppresses_the_tone_overlay() {
    let _ = env_logger::builder().is_test(true).try_init();
    let document = light_page("example.com");
    let video = {
        let mut shared = document.borrow_mut();
        let body = shared.body().unwrap();
        let video = shared.create_element("video");
        shared.append_child(body, video).unwrap();
        shared.set_layout_rect(video, LayoutRect::new(0.0, 0.0, 640.0, 360.0));
        video
    };
    let engine = engine_for(&document, OriginStorage::in_memory(ORIGIN));
    engine.enable().await;

    let snapshot = engine.update(&SettingsPatch::new().sepia(50));
    assert_eq!(snapshot.sepia, 50);
    assert!(snapshot.enabled);
    assert!(find(&document, "darkmode-pro-tone-mask").is_none());
    assert!(find(&document, "darkmode-pro-mask").is_some());

    document.borrow_mut().remove(video);
    engine.update(&SettingsPatch::new().sepia(50));
    let tone = find(&document, "darkmode-pro-tone-mask").unwrap();
    let tone_style = document.borrow().attribute(tone, "style").unwrap().to_owned();
    assert!(tone_style.contains("rgba(255,214,170,0.12)"));
}

#[tokio::test(start_paused = true)]
async fn update_clamps_and_preserves_enabled() {
    let _ = env_logger::builder().is_test(true).try_init();
    let document = light_page("example.com");
    let engine = engine_for(&document, OriginStorage::in_memory(ORIGIN));

    let snapshot = engine.update(&SettingsPatch {
        brightness: Some(json!(250)),
        contrast: Some(json!("10")),
        sepia: Some(json!("lots")),
        grayscale: Some(json!(33.6)),
    });
    assert!(!snapshot.enabled);
    assert_eq!(
        (snapshot.brightness, snapshot.contrast, snapshot.sepia, snapshot.grayscale),
        (100, 50, 12, 34)
    );
    assert!(find(&document, "darkmode-pro").is_none());

    let reset = engine.reset();
    assert_eq!((reset.brightness, reset.sepia), (92, 12));
    assert_eq!(reset.state, RenderState::Disabled);
}

#[tokio::test(start_paused = true)]
async fn settings_persist_across_host_aliases() {
    let _ = env_logger::builder().is_test(true).try_init();
    let registry = SharedStorage::default();
    let store = || OriginStorage::new(Arc::clone(&registry), ORIGIN.to_owned());

    let www = light_page("www.example.com");
    let first = engine_for(&www, store());
    first.enable().await;
    first.update(&SettingsPatch::new().brightness(70));

    let bare = light_page("example.com");
    let second = engine_for(&bare, store());
    let snapshot = second.snapshot();
    assert!(snapshot.enabled);
    assert_eq!(snapshot.brightness, 70);
    second.bootstrap();
    assert_eq!(second.state(), RenderState::Pending);
}

#[tokio::test(start_paused = true)]
async fn legacy_records_only_carry_enabled() {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = OriginStorage::in_memory(ORIGIN);
    store
        .set("darkmode_pro_cache_example.com", r#"{"enabled":true,"brightness":10}"#)
        .unwrap();
    let document = light_page("example.com");
    let engine = engine_for(&document, store);
    let snapshot = engine.snapshot();
    assert!(snapshot.enabled);
    assert_eq!(snapshot.brightness, 92);
}

#[tokio::test(start_paused = true)]
async fn unavailable_storage_never_blocks_rendering() {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = OriginStorage::in_memory(ORIGIN);
    store.registry().lock().unwrap().set_unavailable(ORIGIN, true);
    let document = light_page("example.com");
    let engine = engine_for(&document, store);

    engine.enable().await;

    assert!(engine.is_enabled());
    assert_eq!(engine.state(), RenderState::ResolvedOn);
    assert!(!engine.has_site_record());
}

#[tokio::test(start_paused = true)]
async fn disabling_mid_resolution_wins() {
    let _ = env_logger::builder().is_test(true).try_init();
    let document = light_page("example.com");
    let engine = engine_for(&document, enabled_store("example.com"));
    engine.bootstrap();

    let (state, ()) = futures::join!(engine.resolve(), async {
        sleep(Duration::from_millis(5)).await;
        engine.disable();
    });

    assert_eq!(state, RenderState::Disabled);
    assert_eq!(engine.stats().heuristic_runs, 0);
    assert_eq!(marker(&document), None);
    assert!(!has_pending_guard(&document));
}

#[tokio::test(start_paused = true)]
async fn resolution_waits_for_parsing() {
    let _ = env_logger::builder().is_test(true).try_init();
    let document = light_page("example.com");
    document.borrow_mut().set_ready_state(ReadyState::Loading);
    let engine = engine_for(&document, enabled_store("example.com"));
    engine.bootstrap();

    let started = Instant::now();
    let (state, ()) = futures::join!(engine.resolve(), async {
        sleep(Duration::from_millis(500)).await;
        document.borrow_mut().set_ready_state(ReadyState::Complete);
    });
    assert_eq!(state, RenderState::ResolvedOn);
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn single_page_apps_resolve_once_content_appears() {
    let _ = env_logger::builder().is_test(true).try_init();
    let document = page("app.example.com", "background-color: #fff", "");
    {
        let mut shared = document.borrow_mut();
        let body = shared.body().unwrap();
        let mount = shared.create_element("div");
        shared.set_attribute(mount, "id", "root").unwrap();
        shared.append_child(body, mount).unwrap();
    }
    let engine = engine_for(&document, enabled_store("app.example.com"));
    engine.bootstrap();

    let started = Instant::now();
    let (state, ()) = futures::join!(engine.resolve(), async {
        sleep(Duration::from_millis(300)).await;
        let mut shared = document.borrow_mut();
        let mount = shared.element_by_id(shared.document_node(), "root").unwrap();
        let article = shared.create_element("article");
        shared.append_child(mount, article).unwrap();
    });
    assert_eq!(state, RenderState::ResolvedOn);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(300));
    assert!(waited < Duration::from_millis(1200));
}

#[tokio::test(start_paused = true)]
async fn attach_returns_the_bound_engine_until_destroyed() {
    let _ = env_logger::builder().is_test(true).try_init();
    let document = light_page("example.com");
    let first = DarkModeEngine::attach(
        &document,
        EngineConfig::default(),
        Box::new(OriginStorage::in_memory(ORIGIN)),
    );
    let again = DarkModeEngine::attach(
        &document,
        EngineConfig::default(),
        Box::new(OriginStorage::in_memory(ORIGIN)),
    );
    assert!(first.same_engine(&again));

    first.enable().await;
    assert!(again.is_enabled());

    first.destroy();
    assert_eq!(first.state(), RenderState::Disabled);
    assert!(!first.is_enhancing());
    assert_eq!(marker(&document), None);
    for id in [
        "darkmode-pro",
        "darkmode-pro-mask",
        "darkmode-pro-tone-mask",
        "darkmode-pro-pending",
    ] {
        assert!(find(&document, id).is_none(), "{id} left behind");
    }

    let fresh = DarkModeEngine::attach(
        &document,
        EngineConfig::default(),
        Box::new(OriginStorage::in_memory(ORIGIN)),
    );
    assert!(!fresh.same_engine(&first));
}
