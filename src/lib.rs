// engagement_core: page engagement telemetry for Rust/WASM.
// The engine owns the bounded log and the milestone detectors; JS only forwards
// scroll geometry, UI actions and the unload notification.

mod browser;
mod context;
mod engine;
mod error;
mod event_log;
mod interaction;
mod milestone;
mod record;
mod types;

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use js_sys::Function;
use tracing::debug;
use wasm_bindgen::prelude::*;

pub use browser::{download_export, BrowserPage, IntervalTimer, JsFunctionSink, LocalStorageStore};
pub use context::{EventSink, KeyValueStore, MemoryStore, NoopSink, PageContext, StaticPage};
pub use engine::TelemetryEngine;
pub use error::TelemetryError;
pub use event_log::{load_persisted, BoundedEventLog, DEFAULT_CAPACITY};
pub use interaction::Interaction;
pub use milestone::{scroll_percent, Milestone, MilestoneDetector, MilestoneKind};
pub use record::EventRecord;
pub use types::*;

type BrowserEngine = TelemetryEngine<LocalStorageStore, JsFunctionSink, BrowserPage>;

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn js_error(err: TelemetryError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Parse caller properties from JSON. An empty string means no properties.
fn parse_properties(properties_json: &str) -> Result<Properties, TelemetryError> {
    if properties_json.trim().is_empty() {
        return Ok(Properties::new());
    }
    Ok(serde_json::from_str(properties_json)?)
}

/// Telemetry handle exposed to JavaScript. Create one per page load.
#[wasm_bindgen]
pub struct Telemetry {
    engine: Rc<RefCell<BrowserEngine>>,
    sampler: Option<IntervalTimer>,
}

impl Telemetry {
    fn engine(&self) -> Result<Ref<'_, BrowserEngine>, JsValue> {
        self.engine
            .try_borrow()
            .map_err(|_| JsValue::from_str("telemetry engine is busy"))
    }

    fn engine_mut(&self) -> Result<RefMut<'_, BrowserEngine>, JsValue> {
        self.engine
            .try_borrow_mut()
            .map_err(|_| JsValue::from_str("telemetry engine is busy"))
    }
}

#[wasm_bindgen]
impl Telemetry {
    /// Create the engine, restore the persisted log and record `page_view`.
    /// `forwarder`, if given, receives every event as `(name, properties)`.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str, forwarder: Option<Function>) -> Result<Telemetry, JsValue> {
        let config = TelemetryConfig::from_json(config_json).map_err(js_error)?;
        let page = BrowserPage::new().map_err(js_error)?;

        let mut engine = TelemetryEngine::new(
            config,
            LocalStorageStore::open(),
            JsFunctionSink::new(forwarder),
            page,
        )
        .map_err(js_error)?;
        engine.record_page_view();

        Ok(Telemetry {
            engine: Rc::new(RefCell::new(engine)),
            sampler: None,
        })
    }

    /// Start the periodic time-on-page sampler. Calling it again is a no-op.
    pub fn start_clock(&mut self) -> Result<(), JsValue> {
        if self.sampler.is_some() {
            return Ok(());
        }
        let period_secs = self.engine()?.config().time_sample_interval_secs;
        let period_ms = i32::try_from(u64::from(period_secs) * 1000).unwrap_or(i32::MAX);

        let engine = Rc::clone(&self.engine);
        let timer = IntervalTimer::every(period_ms, move || {
            if let Ok(mut engine) = engine.try_borrow_mut() {
                engine.on_clock_tick();
            } else {
                debug!(target: "engagement_core", "engine busy; skipping clock tick");
            }
        })
        .map_err(js_error)?;

        self.sampler = Some(timer);
        Ok(())
    }

    /// Scroll notification. Returns how many milestones fired.
    pub fn on_scroll(
        &mut self,
        scroll_y: f64,
        scroll_height: f64,
        viewport_height: f64,
    ) -> Result<u32, JsValue> {
        let fired = self
            .engine_mut()?
            .on_scroll_position(scroll_y, scroll_height, viewport_height);
        Ok(fired.len() as u32)
    }

    /// Time notification for hosts that run their own scheduler.
    pub fn on_time_sample(&mut self, elapsed_seconds: u32) -> Result<u32, JsValue> {
        let fired = self
            .engine_mut()?
            .on_time_sample(u64::from(elapsed_seconds));
        Ok(fired.len() as u32)
    }

    /// Record an arbitrary event. `properties_json` is a JSON object or empty.
    pub fn track(&mut self, name: &str, properties_json: &str) -> Result<(), JsValue> {
        let properties = parse_properties(properties_json).map_err(js_error)?;
        self.engine_mut()?.record(name, &properties);
        Ok(())
    }

    /// Record a typed interaction, e.g. `{"type":"paper_click","paper_id":"p1"}`.
    pub fn track_interaction(&mut self, interaction_json: &str) -> Result<(), JsValue> {
        let interaction: Interaction = serde_json::from_str(interaction_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid interaction: {}", e)))?;
        self.engine_mut()?.track(&interaction);
        Ok(())
    }

    /// Unload notification: stop the sampler and record `page_exit`.
    pub fn page_exit(&mut self) -> Result<(), JsValue> {
        if let Some(mut sampler) = self.sampler.take() {
            sampler.cancel();
        }
        self.engine_mut()?.record_page_exit_now();
        Ok(())
    }

    /// Export snapshot as pretty JSON.
    pub fn export_json(&self) -> Result<String, JsValue> {
        let artifact = self.engine()?.export_artifact().map_err(js_error)?;
        Ok(artifact.contents)
    }

    /// Download the export snapshot as a dated JSON file.
    pub fn download_export(&self) -> Result<(), JsValue> {
        let artifact = self.engine()?.export_artifact().map_err(js_error)?;
        browser::download_export(&artifact).map_err(js_error)
    }

    /// Number of events recorded during this page load.
    pub fn event_count(&self) -> Result<u32, JsValue> {
        Ok(self.engine()?.events().len() as u32)
    }
}
