// Shared types: event properties, engine configuration, environment descriptor,
// and the export snapshot handed back to JS.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;
use crate::record::EventRecord;

/// Event properties. Values are arbitrary JSON.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Engine configuration passed from JS. Every field has a default, so `{}` is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Store key holding the persisted log.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    /// Maximum number of records kept in memory and in the store.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Scroll-depth milestones, in percent.
    #[serde(default = "default_scroll_thresholds")]
    pub scroll_thresholds: Vec<u32>,
    /// Time-on-page milestones, in seconds.
    #[serde(default = "default_time_thresholds")]
    pub time_thresholds: Vec<u32>,
    /// Period of the time-on-page sampler, in seconds.
    #[serde(default = "default_time_sample_interval")]
    pub time_sample_interval_secs: u32,
    /// File name prefix for exported snapshots.
    #[serde(default = "default_export_prefix")]
    pub export_prefix: String,
}

fn default_storage_key() -> String {
    "engagement_analytics".to_string()
}

fn default_capacity() -> usize {
    100
}

fn default_scroll_thresholds() -> Vec<u32> {
    vec![25, 50, 75, 90, 100]
}

fn default_time_thresholds() -> Vec<u32> {
    vec![30, 60, 120, 300] // 30s, 1m, 2m, 5m
}

fn default_time_sample_interval() -> u32 {
    10
}

fn default_export_prefix() -> String {
    "engagement-analytics".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            storage_key: default_storage_key(),
            capacity: default_capacity(),
            scroll_thresholds: default_scroll_thresholds(),
            time_thresholds: default_time_thresholds(),
            time_sample_interval_secs: default_time_sample_interval(),
            export_prefix: default_export_prefix(),
        }
    }
}

impl TelemetryConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(config_json: &str) -> Result<Self, TelemetryError> {
        let config: TelemetryConfig = serde_json::from_str(config_json)
            .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.storage_key.is_empty() {
            return Err(TelemetryError::InvalidConfig(
                "storage_key must not be empty".to_string(),
            ));
        }
        if self.capacity == 0 {
            return Err(TelemetryError::InvalidConfig(
                "capacity must be at least 1".to_string(),
            ));
        }
        if self.time_sample_interval_secs == 0 {
            return Err(TelemetryError::InvalidConfig(
                "time_sample_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read-only snapshot of the browsing environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EnvironmentDescriptor {
    pub user_agent: String,
    /// "WIDTHxHEIGHT" of the physical screen.
    pub screen_resolution: String,
    /// "WIDTHxHEIGHT" of the layout viewport.
    pub viewport_size: String,
}

impl EnvironmentDescriptor {
    pub fn new(user_agent: impl Into<String>, screen: (u32, u32), viewport: (u32, u32)) -> Self {
        EnvironmentDescriptor {
            user_agent: user_agent.into(),
            screen_resolution: format!("{}x{}", screen.0, screen.1),
            viewport_size: format!("{}x{}", viewport.0, viewport.1),
        }
    }

    /// Flatten into a string mapping.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("user_agent".to_string(), self.user_agent.clone());
        map.insert(
            "screen_resolution".to_string(),
            self.screen_resolution.clone(),
        );
        map.insert("viewport_size".to_string(), self.viewport_size.clone());
        map
    }
}

/// Composite returned by an export: this session's events, the persisted log,
/// and a description of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSnapshot {
    pub events: Vec<EventRecord>,
    pub stored_events: Vec<EventRecord>,
    pub session_info: BTreeMap<String, String>,
}

/// A ready-to-download export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub contents: String,
}
