// Telemetry engine: routes scroll samples, clock ticks and UI actions through the
// milestone detectors into records, then into the bounded log and the sink.
// One engine per hard page load; nothing here is global.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use tracing::{debug, warn};

use crate::context::{EventSink, KeyValueStore, PageContext};
use crate::error::TelemetryError;
use crate::event_log::BoundedEventLog;
use crate::interaction::Interaction;
use crate::milestone::{scroll_percent, Milestone, MilestoneDetector};
use crate::record::EventRecord;
use crate::types::{ExportArtifact, ExportSnapshot, Properties, TelemetryConfig};

pub struct TelemetryEngine<S: KeyValueStore, F: EventSink, P: PageContext> {
    config: TelemetryConfig,
    log: BoundedEventLog<S>,
    sink: F,
    page: P,
    scroll: MilestoneDetector,
    time: MilestoneDetector,
    started_at: DateTime<Utc>,
    unloaded: bool,
}

impl<S: KeyValueStore, F: EventSink, P: PageContext> TelemetryEngine<S, F, P> {
    /// Create an engine for the current page load. Loads the persisted log from `store`.
    pub fn new(config: TelemetryConfig, store: S, sink: F, page: P) -> Result<Self, TelemetryError> {
        config.validate()?;

        let log = BoundedEventLog::open(store, &config.storage_key, config.capacity);
        let scroll = MilestoneDetector::scroll_depth(&config.scroll_thresholds);
        let time = MilestoneDetector::time_on_page(&config.time_thresholds);
        let started_at = page.now();

        Ok(TelemetryEngine {
            config,
            log,
            sink,
            page,
            scroll,
            time,
            started_at,
            unloaded: false,
        })
    }

    /// Build a record, append it to the log, then forward it to the sink.
    /// A failing sink does not undo the append.
    pub fn record(&mut self, name: &str, properties: &Properties) {
        let record = EventRecord::build(name, properties, &self.page);
        debug!(target: "engagement_core::engine", event = name, "recording event");

        let forwarded = record.clone();
        self.log.append(record);

        if let Err(err) = self.sink.forward(forwarded.name(), forwarded.properties()) {
            warn!(
                target: "engagement_core::engine",
                event = name,
                error = %err,
                "event sink rejected event"
            );
        }
    }

    /// Record the initial `page_view` with the environment descriptor.
    pub fn record_page_view(&mut self) {
        let env = self.page.environment();
        let mut props = Properties::new();
        props.insert("page".to_string(), json!(self.page.path()));
        props.insert("user_agent".to_string(), json!(env.user_agent));
        props.insert("screen_resolution".to_string(), json!(env.screen_resolution));
        props.insert("viewport_size".to_string(), json!(env.viewport_size));
        self.record("page_view", &props);
    }

    /// Record a discrete UI interaction.
    pub fn track(&mut self, interaction: &Interaction) {
        self.record(interaction.event_name(), &interaction.properties());
    }

    /// Feed a scroll percentage. Returns the milestones it crossed.
    pub fn on_scroll_sample(&mut self, percent: i64) -> Vec<Milestone> {
        if self.unloaded {
            return Vec::new();
        }
        let fired = self.scroll.observe(percent);
        self.record_milestones(&fired);
        fired
    }

    /// Feed raw scroll geometry. Samples from a page that cannot scroll are skipped.
    pub fn on_scroll_position(
        &mut self,
        scroll_y: f64,
        scroll_height: f64,
        viewport_height: f64,
    ) -> Vec<Milestone> {
        match scroll_percent(scroll_y, scroll_height, viewport_height) {
            Some(percent) => self.on_scroll_sample(percent),
            None => {
                debug!(
                    target: "engagement_core::engine",
                    scroll_y,
                    scroll_height,
                    viewport_height,
                    "skipping non-finite scroll sample"
                );
                Vec::new()
            }
        }
    }

    /// Feed elapsed seconds since page load. Returns the milestones it crossed.
    pub fn on_time_sample(&mut self, elapsed_seconds: u64) -> Vec<Milestone> {
        if self.unloaded {
            return Vec::new();
        }
        let elapsed = i64::try_from(elapsed_seconds).unwrap_or(i64::MAX);
        let fired = self.time.observe(elapsed);
        self.record_milestones(&fired);
        fired
    }

    /// Periodic sampler entry point: samples elapsed time from the page clock.
    pub fn on_clock_tick(&mut self) -> Vec<Milestone> {
        let elapsed = self.elapsed_seconds();
        self.on_time_sample(elapsed)
    }

    fn record_milestones(&mut self, milestones: &[Milestone]) {
        for milestone in milestones {
            self.record(milestone.event_name(), &milestone.properties());
        }
    }

    /// Whole seconds since the engine was created, rounded to nearest.
    pub fn elapsed_seconds(&self) -> u64 {
        let millis = (self.page.now() - self.started_at).num_milliseconds().max(0);
        ((millis + 500) / 1000) as u64
    }

    /// Record `page_exit`. Ends the page visit: later samples are ignored.
    pub fn record_page_exit(&mut self, total_seconds: u64) {
        let mut props = Properties::new();
        props.insert("total_time_seconds".to_string(), json!(total_seconds));
        self.record("page_exit", &props);
        self.unloaded = true;
    }

    /// Record `page_exit` with the elapsed time from the page clock.
    pub fn record_page_exit_now(&mut self) {
        let total = self.elapsed_seconds();
        self.record_page_exit(total);
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded
    }

    /// Events recorded during this page load.
    pub fn events(&self) -> Vec<EventRecord> {
        self.log.all()
    }

    /// The persisted log, including earlier page loads.
    pub fn stored_events(&self) -> Vec<EventRecord> {
        self.log.stored()
    }

    pub fn session_info(&self) -> BTreeMap<String, String> {
        let mut info = self.page.environment().to_map();
        info.insert(
            "start_time".to_string(),
            self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        info.insert("referrer".to_string(), self.page.referrer());
        info
    }

    pub fn export_snapshot(&self) -> ExportSnapshot {
        ExportSnapshot {
            events: self.events(),
            stored_events: self.stored_events(),
            session_info: self.session_info(),
        }
    }

    /// Pretty-printed snapshot named after today's date.
    pub fn export_artifact(&self) -> Result<ExportArtifact, TelemetryError> {
        let contents = serde_json::to_string_pretty(&self.export_snapshot())?;
        let file_name = format!(
            "{}-{}.json",
            self.config.export_prefix,
            self.page.now().format("%Y-%m-%d")
        );
        Ok(ExportArtifact {
            file_name,
            contents,
        })
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn sink(&self) -> &F {
        &self.sink
    }

    pub fn store(&self) -> &S {
        self.log.store()
    }

    pub fn scroll_detector(&self) -> &MilestoneDetector {
        &self.scroll
    }

    pub fn time_detector(&self) -> &MilestoneDetector {
        &self.time
    }
}
