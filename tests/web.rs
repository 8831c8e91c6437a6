// Browser-only checks for the wasm bindings. Run with `wasm-pack test --headless --chrome`.
#![cfg(target_arch = "wasm32")]

use engagement_core::{
    load_persisted, BrowserPage, IntervalTimer, KeyValueStore, LocalStorageStore, PageContext,
    Telemetry,
};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn local_storage_round_trip() {
    let mut store = LocalStorageStore::open();
    store.set("engagement_core_test", "[]").unwrap();
    assert_eq!(
        store.get("engagement_core_test").unwrap().as_deref(),
        Some("[]")
    );
}

#[wasm_bindgen_test]
fn browser_page_describes_environment() {
    let page = BrowserPage::new().unwrap();
    assert!(page.url().starts_with("http"));
    assert!(!page.environment().user_agent.is_empty());
}

#[wasm_bindgen_test]
fn telemetry_records_page_view_and_persists() {
    let key = "engagement_core_handle_test";
    let config = format!(r#"{{"storage_key":"{}"}}"#, key);
    let mut telemetry = Telemetry::new(&config, None).unwrap();
    assert_eq!(telemetry.event_count().unwrap(), 1);

    telemetry
        .track_interaction(r#"{"type":"navigation_click","target_section":"download"}"#)
        .unwrap();
    telemetry.page_exit().unwrap();
    assert_eq!(telemetry.event_count().unwrap(), 3);

    let persisted = load_persisted(&LocalStorageStore::open(), key, 100);
    assert!(persisted.len() >= 3);
    assert_eq!(persisted.last().map(|r| r.name()), Some("page_exit"));
}

#[wasm_bindgen_test]
fn interval_timer_cancels() {
    let mut timer = IntervalTimer::every(10_000, || {}).unwrap();
    assert!(timer.is_active());
    timer.cancel();
    assert!(!timer.is_active());
}
