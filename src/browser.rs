// Browser implementations of the engine's capabilities: window.localStorage,
// a JS forwarder function, the live window/document, a cancellable interval
// timer, and the export download.

use chrono::Utc;
use js_sys::{Array, Function};
use tracing::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Blob, BlobPropertyBag, HtmlAnchorElement, Storage, Url, Window};

use crate::context::{EventSink, KeyValueStore, PageContext};
use crate::error::TelemetryError;
use crate::types::{EnvironmentDescriptor, ExportArtifact, Properties};

fn window() -> Result<Window, TelemetryError> {
    web_sys::window().ok_or_else(|| TelemetryError::Environment("no global window".to_string()))
}

fn describe(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

fn environment_error(value: JsValue) -> TelemetryError {
    TelemetryError::Environment(describe(&value))
}

/// `window.localStorage`. Storage may be disabled (private mode, sandboxed
/// iframes); every operation then fails with a persistence error.
pub struct LocalStorageStore {
    storage: Option<Storage>,
}

impl LocalStorageStore {
    pub fn open() -> Self {
        let storage = web_sys::window().and_then(|w| w.local_storage().ok().flatten());
        if storage.is_none() {
            warn!(target: "engagement_core::browser", "local storage unavailable; events kept in memory only");
        }
        LocalStorageStore { storage }
    }

    fn storage(&self, key: &str) -> Result<&Storage, TelemetryError> {
        self.storage.as_ref().ok_or_else(|| TelemetryError::Persistence {
            key: key.to_string(),
            message: "local storage unavailable".to_string(),
        })
    }
}

impl KeyValueStore for LocalStorageStore {
    fn get(&self, key: &str) -> Result<Option<String>, TelemetryError> {
        self.storage(key)?
            .get_item(key)
            .map_err(|e| TelemetryError::Persistence {
                key: key.to_string(),
                message: describe(&e),
            })
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), TelemetryError> {
        self.storage(key)?
            .set_item(key, value)
            .map_err(|e| TelemetryError::Persistence {
                key: key.to_string(),
                message: describe(&e),
            })
    }
}

/// Forwards events to a JS function called as `f(name, properties)`,
/// typically a shim over `gtag('event', ...)`. Without a function it does nothing.
pub struct JsFunctionSink {
    function: Option<Function>,
}

impl JsFunctionSink {
    pub fn new(function: Option<Function>) -> Self {
        JsFunctionSink { function }
    }
}

impl EventSink for JsFunctionSink {
    fn forward(&self, name: &str, properties: &Properties) -> Result<(), TelemetryError> {
        let Some(function) = &self.function else {
            return Ok(());
        };

        let forwarding_error = |message: String| TelemetryError::Forwarding {
            event: name.to_string(),
            message,
        };
        let json = serde_json::to_string(properties)?;
        let props = js_sys::JSON::parse(&json).map_err(|e| forwarding_error(describe(&e)))?;
        function
            .call2(&JsValue::NULL, &JsValue::from_str(name), &props)
            .map(|_| ())
            .map_err(|e| forwarding_error(describe(&e)))
    }
}

/// The live page.
pub struct BrowserPage {
    window: Window,
}

impl BrowserPage {
    pub fn new() -> Result<Self, TelemetryError> {
        Ok(BrowserPage { window: window()? })
    }

    fn viewport(&self) -> (u32, u32) {
        let dimension = |value: Result<JsValue, JsValue>| {
            value.ok().and_then(|v| v.as_f64()).unwrap_or(0.0).max(0.0) as u32
        };
        (
            dimension(self.window.inner_width()),
            dimension(self.window.inner_height()),
        )
    }

    fn screen(&self) -> (u32, u32) {
        match self.window.screen() {
            Ok(screen) => (
                screen.width().unwrap_or(0).max(0) as u32,
                screen.height().unwrap_or(0).max(0) as u32,
            ),
            Err(_) => (0, 0),
        }
    }
}

impl PageContext for BrowserPage {
    fn now(&self) -> chrono::DateTime<Utc> {
        Utc::now()
    }

    fn url(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    fn path(&self) -> String {
        self.window.location().pathname().unwrap_or_default()
    }

    fn referrer(&self) -> String {
        self.window
            .document()
            .map(|d| d.referrer())
            .unwrap_or_default()
    }

    fn environment(&self) -> EnvironmentDescriptor {
        let user_agent = self.window.navigator().user_agent().unwrap_or_default();
        EnvironmentDescriptor::new(user_agent, self.screen(), self.viewport())
    }
}

/// `setInterval` handle. The interval is cleared on `cancel` or drop, so no
/// tick fires after the owner is torn down.
pub struct IntervalTimer {
    window: Window,
    handle: Option<i32>,
    _callback: Closure<dyn FnMut()>,
}

impl IntervalTimer {
    pub fn every<C>(period_ms: i32, callback: C) -> Result<Self, TelemetryError>
    where
        C: FnMut() + 'static,
    {
        let window = window()?;
        let callback = Closure::<dyn FnMut()>::new(callback);
        let handle = window
            .set_interval_with_callback_and_timeout_and_arguments_0(
                callback.as_ref().unchecked_ref(),
                period_ms,
            )
            .map_err(environment_error)?;

        Ok(IntervalTimer {
            window,
            handle: Some(handle),
            _callback: callback,
        })
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.window.clear_interval_with_handle(handle);
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Offer `artifact` to the user as a JSON file download.
pub fn download_export(artifact: &ExportArtifact) -> Result<(), TelemetryError> {
    let window = window()?;
    let document = window
        .document()
        .ok_or_else(|| TelemetryError::Environment("no document".to_string()))?;
    let body = document
        .body()
        .ok_or_else(|| TelemetryError::Environment("no document body".to_string()))?;

    let options = BlobPropertyBag::new();
    options.set_type("application/json");
    let parts = Array::of1(&JsValue::from_str(&artifact.contents));
    let blob = Blob::new_with_str_sequence_and_options(&parts, &options).map_err(environment_error)?;
    let url = Url::create_object_url_with_blob(&blob).map_err(environment_error)?;

    let anchor: HtmlAnchorElement = document
        .create_element("a")
        .map_err(environment_error)?
        .dyn_into()
        .map_err(|_| TelemetryError::Environment("anchor element unavailable".to_string()))?;
    anchor.set_href(&url);
    anchor.set_download(&artifact.file_name);

    body.append_child(&anchor).map_err(environment_error)?;
    anchor.click();
    body.remove_child(&anchor).map_err(environment_error)?;
    Url::revoke_object_url(&url).map_err(environment_error)?;
    Ok(())
}
