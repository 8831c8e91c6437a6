// One telemetry event. Built once, never mutated.
// Context fields (timestamp, url, referrer) are written after the caller's
// properties, so they win on key collision.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::PageContext;
use crate::types::Properties;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    name: String,
    properties: Properties,
    occurred_at: DateTime<Utc>,
}

impl EventRecord {
    /// Stamp `extra` with the current time, URL and referrer of `page`.
    pub fn build(name: &str, extra: &Properties, page: &dyn PageContext) -> Self {
        let occurred_at = page.now();
        let mut properties = extra.clone();
        properties.insert(
            "timestamp".to_string(),
            Value::String(occurred_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        properties.insert("url".to_string(), Value::String(page.url()));
        properties.insert("referrer".to_string(), Value::String(page.referrer()));

        EventRecord {
            name: name.to_string(),
            properties,
            occurred_at,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Shorthand for `properties().get(key)`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}
