// Capabilities the engine is given rather than reaching for globals:
// an event forwarder, a key-value store, and the page it runs on.
// Browser implementations live in browser.rs.

use std::cell::Cell;
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::error::TelemetryError;
use crate::types::{EnvironmentDescriptor, Properties};

/// Best-effort consumer of emitted events (third-party analytics).
pub trait EventSink {
    fn forward(&self, name: &str, properties: &Properties) -> Result<(), TelemetryError>;
}

/// Key-value string store (local storage).
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, TelemetryError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), TelemetryError>;
}

/// The page being observed.
pub trait PageContext {
    fn now(&self) -> DateTime<Utc>;
    /// Full location href.
    fn url(&self) -> String;
    /// Location pathname.
    fn path(&self) -> String;
    fn referrer(&self) -> String;
    fn environment(&self) -> EnvironmentDescriptor;
}

/// Sink used when no analytics forwarder is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn forward(&self, _name: &str, _properties: &Properties) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// In-memory store for native hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut store = Self::new();
        store.entries.insert(key.to_string(), value.to_string());
        store
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, TelemetryError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), TelemetryError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Fixed page description with a manually advanced clock.
#[derive(Debug, Clone)]
pub struct StaticPage {
    now: Cell<DateTime<Utc>>,
    pub url: String,
    pub path: String,
    pub referrer: String,
    pub environment: EnvironmentDescriptor,
}

impl StaticPage {
    pub fn new(url: &str, path: &str, referrer: &str, started_at: DateTime<Utc>) -> Self {
        StaticPage {
            now: Cell::new(started_at),
            url: url.to_string(),
            path: path.to_string(),
            referrer: referrer.to_string(),
            environment: EnvironmentDescriptor::default(),
        }
    }

    pub fn with_environment(mut self, environment: EnvironmentDescriptor) -> Self {
        self.environment = environment;
        self
    }

    pub fn advance_millis(&self, millis: i64) {
        self.now.set(self.now.get() + Duration::milliseconds(millis));
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance_millis(secs * 1000);
    }
}

impl PageContext for StaticPage {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    fn referrer(&self) -> String {
        self.referrer.clone()
    }

    fn environment(&self) -> EnvironmentDescriptor {
        self.environment.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn memory_store_overwrites() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "1").unwrap();
        store.set("k", "2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn static_page_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let page = StaticPage::new("https://example.com/", "/", "", start);
        page.advance_secs(30);
        assert_eq!((page.now() - start).num_seconds(), 30);
    }
}
