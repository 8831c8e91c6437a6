// Ordered-threshold milestone detection for scroll depth and time on page.
// Invariant: a threshold fires at most once per detector, and thresholds that fire
// together fire in ascending order. A detector lives for one page load.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::types::Properties;

/// Which signal a detector watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MilestoneKind {
    /// Percentage of the page scrolled. Tracks a high-water mark.
    ScrollDepth,
    /// Whole seconds since the page loaded.
    TimeOnPage,
}

impl MilestoneKind {
    pub fn event_name(&self) -> &'static str {
        match self {
            MilestoneKind::ScrollDepth => "scroll_depth",
            MilestoneKind::TimeOnPage => "time_on_page",
        }
    }
}

/// A threshold crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub kind: MilestoneKind,
    pub threshold: u32,
    /// High-water mark (scroll) or elapsed seconds (time) when it fired.
    pub observed: i64,
}

impl Milestone {
    pub fn event_name(&self) -> &'static str {
        self.kind.event_name()
    }

    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        match self.kind {
            MilestoneKind::ScrollDepth => {
                props.insert("depth_percent".to_string(), json!(self.threshold));
                props.insert("max_scroll".to_string(), json!(self.observed));
            }
            MilestoneKind::TimeOnPage => {
                props.insert("seconds".to_string(), json!(self.threshold));
                props.insert("total_seconds".to_string(), json!(self.observed));
            }
        }
        props
    }
}

/// Tracks which of a fixed, ascending set of thresholds have fired.
#[derive(Debug, Clone)]
pub struct MilestoneDetector {
    kind: MilestoneKind,
    thresholds: Vec<u32>,
    fired: BTreeSet<u32>,
    max_observed: i64,
}

impl MilestoneDetector {
    /// Thresholds are sorted and de-duplicated.
    pub fn new(kind: MilestoneKind, thresholds: &[u32]) -> Self {
        let mut thresholds = thresholds.to_vec();
        thresholds.sort_unstable();
        thresholds.dedup();

        MilestoneDetector {
            kind,
            thresholds,
            fired: BTreeSet::new(),
            max_observed: 0,
        }
    }

    pub fn scroll_depth(thresholds: &[u32]) -> Self {
        Self::new(MilestoneKind::ScrollDepth, thresholds)
    }

    pub fn time_on_page(thresholds: &[u32]) -> Self {
        Self::new(MilestoneKind::TimeOnPage, thresholds)
    }

    /// Feed one sample and return the thresholds it crossed, ascending.
    ///
    /// Scroll depth only evaluates when the sample raises the high-water mark;
    /// time on page evaluates every sample against the sample itself.
    pub fn observe(&mut self, sample: i64) -> Vec<Milestone> {
        let observed = match self.kind {
            MilestoneKind::ScrollDepth => {
                if sample <= self.max_observed {
                    return Vec::new();
                }
                self.max_observed = sample;
                sample
            }
            MilestoneKind::TimeOnPage => {
                self.max_observed = self.max_observed.max(sample);
                sample
            }
        };

        let mut crossed = Vec::new();
        for &threshold in &self.thresholds {
            if observed < i64::from(threshold) {
                break;
            }
            if self.fired.insert(threshold) {
                crossed.push(Milestone {
                    kind: self.kind,
                    threshold,
                    observed,
                });
            }
        }
        crossed
    }

    pub fn kind(&self) -> MilestoneKind {
        self.kind
    }

    pub fn thresholds(&self) -> &[u32] {
        &self.thresholds
    }

    /// Largest sample seen so far.
    pub fn max_observed(&self) -> i64 {
        self.max_observed
    }

    pub fn has_fired(&self, threshold: u32) -> bool {
        self.fired.contains(&threshold)
    }

    /// Fired thresholds, ascending.
    pub fn fired(&self) -> Vec<u32> {
        self.fired.iter().copied().collect()
    }

    /// True once every threshold has fired.
    pub fn is_exhausted(&self) -> bool {
        self.fired.len() == self.thresholds.len()
    }
}

/// Scroll position as a rounded percentage of the scrollable distance.
/// Returns `None` when the result is not finite (e.g. the page cannot scroll).
pub fn scroll_percent(scroll_y: f64, scroll_height: f64, viewport_height: f64) -> Option<i64> {
    let percent = (scroll_y / (scroll_height - viewport_height) * 100.0).round();
    if percent.is_finite() {
        Some(percent as i64)
    } else {
        None
    }
}
