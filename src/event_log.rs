// Bounded rolling event log backed by a keyed store.
// Invariant: neither the session log nor the persisted log ever exceeds capacity;
// overflow drops the oldest records. Store failures never propagate.
// The store is the source of truth for the persisted log: every append re-reads it,
// so records written by another tab since this page loaded are kept.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::context::KeyValueStore;
use crate::error::TelemetryError;
use crate::record::EventRecord;

/// Default number of retained records.
pub const DEFAULT_CAPACITY: usize = 100;

/// Append-only log with oldest-eviction.
///
/// Holds two views: the records appended since construction (`all`) and the
/// persisted log, which also carries records from earlier page loads (`stored`).
pub struct BoundedEventLog<S: KeyValueStore> {
    store: S,
    key: String,
    capacity: usize,
    session: VecDeque<EventRecord>,
    // Last persisted view; only consulted while the store cannot be read.
    fallback: VecDeque<EventRecord>,
}

impl<S: KeyValueStore> BoundedEventLog<S> {
    /// Open the log, loading whatever was persisted under `key`.
    /// A capacity of zero is treated as one.
    pub fn open(store: S, key: &str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let restored = load_persisted(&store, key, capacity);
        debug!(
            target: "engagement_core::event_log",
            key,
            capacity,
            restored = restored.len(),
            "event log opened"
        );

        BoundedEventLog {
            store,
            key: key.to_string(),
            capacity,
            session: VecDeque::with_capacity(capacity),
            fallback: restored.into(),
        }
    }

    /// Append a record: re-read the persisted log, push, and write it back.
    pub fn append(&mut self, record: EventRecord) {
        push_bounded(&mut self.session, record.clone(), self.capacity);

        let mut persisted: VecDeque<EventRecord> = self.read_or_fallback().into();
        push_bounded(&mut persisted, record, self.capacity);

        if let Err(err) = self.persist(&persisted) {
            warn!(
                target: "engagement_core::event_log",
                key = %self.key,
                error = %err,
                "failed to persist event log"
            );
        }
        self.fallback = persisted;
    }

    fn persist(&mut self, persisted: &VecDeque<EventRecord>) -> Result<(), TelemetryError> {
        let json = serde_json::to_string(persisted)?;
        self.store.set(&self.key, &json)
    }

    fn read_or_fallback(&self) -> Vec<EventRecord> {
        match read_persisted(&self.store, &self.key, self.capacity) {
            Ok(records) => records,
            Err(err) => {
                warn!(
                    target: "engagement_core::event_log",
                    key = %self.key,
                    error = %err,
                    "event store unreadable; using last known log"
                );
                self.fallback.iter().cloned().collect()
            }
        }
    }

    /// Records appended since the log was opened, oldest first.
    pub fn all(&self) -> Vec<EventRecord> {
        self.session.iter().cloned().collect()
    }

    /// The persisted log as currently held by the store: earlier page loads
    /// followed by this one. Falls back to the last known log if the store
    /// cannot be read.
    pub fn stored(&self) -> Vec<EventRecord> {
        self.read_or_fallback()
    }

    pub fn len(&self) -> usize {
        self.session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.session.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Read the persisted log. Missing, unreadable or malformed data yields an empty log.
pub fn load_persisted<S: KeyValueStore + ?Sized>(
    store: &S,
    key: &str,
    capacity: usize,
) -> Vec<EventRecord> {
    read_persisted(store, key, capacity).unwrap_or_else(|err| {
        warn!(target: "engagement_core::event_log", key, error = %err, "event store unreadable");
        Vec::new()
    })
}

/// Like `load_persisted`, but an unreadable store is an error.
/// Malformed data still reads as an empty log.
fn read_persisted<S: KeyValueStore + ?Sized>(
    store: &S,
    key: &str,
    capacity: usize,
) -> Result<Vec<EventRecord>, TelemetryError> {
    let Some(raw) = store.get(key)? else {
        return Ok(Vec::new());
    };

    match serde_json::from_str::<Vec<EventRecord>>(&raw) {
        Ok(mut records) => {
            if records.len() > capacity {
                records.drain(..records.len() - capacity);
            }
            Ok(records)
        }
        Err(err) => {
            warn!(target: "engagement_core::event_log", key, error = %err, "discarding malformed event log");
            Ok(Vec::new())
        }
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, limit: usize) {
    queue.push_back(item);
    while queue.len() > limit {
        queue.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{MemoryStore, StaticPage};
    use crate::types::Properties;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const KEY: &str = "engagement_analytics";

    fn page() -> StaticPage {
        StaticPage::new(
            "https://example.com/",
            "/",
            "",
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
    }

    fn record(page: &StaticPage, i: usize) -> EventRecord {
        let mut props = Properties::new();
        props.insert("seq".to_string(), serde_json::json!(i));
        EventRecord::build(&format!("event_{}", i), &props, page)
    }

    fn names(records: &[EventRecord]) -> Vec<String> {
        records.iter().map(|r| r.name().to_string()).collect()
    }

    /// Store whose writes always fail, like a full or disabled local storage.
    struct QuotaExceededStore;

    impl KeyValueStore for QuotaExceededStore {
        fn get(&self, _key: &str) -> Result<Option<String>, TelemetryError> {
            Ok(None)
        }

        fn set(&mut self, key: &str, _value: &str) -> Result<(), TelemetryError> {
            Err(TelemetryError::Persistence {
                key: key.to_string(),
                message: "QuotaExceededError".to_string(),
            })
        }
    }

    /// Store that cannot be read at all.
    struct DisabledStore;

    impl KeyValueStore for DisabledStore {
        fn get(&self, key: &str) -> Result<Option<String>, TelemetryError> {
            Err(TelemetryError::Persistence {
                key: key.to_string(),
                message: "SecurityError".to_string(),
            })
        }

        fn set(&mut self, key: &str, _value: &str) -> Result<(), TelemetryError> {
            Err(TelemetryError::Persistence {
                key: key.to_string(),
                message: "SecurityError".to_string(),
            })
        }
    }

    #[test]
    fn persistence_round_trip() {
        let page = page();
        let mut log = BoundedEventLog::open(MemoryStore::new(), KEY, DEFAULT_CAPACITY);
        for i in 0..3 {
            log.append(record(&page, i));
        }

        let reloaded = load_persisted(log.store(), KEY, DEFAULT_CAPACITY);
        assert_eq!(reloaded, log.all());
        assert_eq!(names(&reloaded), vec!["event_0", "event_1", "event_2"]);
    }

    #[test]
    fn corrupted_store_loads_empty() {
        let store = MemoryStore::with_entry(KEY, "{not json");
        assert!(load_persisted(&store, KEY, DEFAULT_CAPACITY).is_empty());

        let log = BoundedEventLog::open(store, KEY, DEFAULT_CAPACITY);
        assert!(log.stored().is_empty());
    }

    #[test]
    fn missing_key_loads_empty() {
        assert!(load_persisted(&MemoryStore::new(), KEY, DEFAULT_CAPACITY).is_empty());
    }

    #[test]
    fn previous_sessions_carry_into_stored_only() {
        let page = page();
        let mut first = BoundedEventLog::open(MemoryStore::new(), KEY, DEFAULT_CAPACITY);
        first.append(record(&page, 0));
        first.append(record(&page, 1));

        let store = first.store().clone();
        let mut second = BoundedEventLog::open(store, KEY, DEFAULT_CAPACITY);
        second.append(record(&page, 2));

        assert_eq!(names(&second.all()), vec!["event_2"]);
        assert_eq!(
            names(&second.stored()),
            vec!["event_0", "event_1", "event_2"]
        );
    }

    #[test]
    fn oversized_persisted_log_is_trimmed_on_load() {
        let page = page();
        let records: Vec<EventRecord> = (0..8).map(|i| record(&page, i)).collect();
        let store = MemoryStore::with_entry(KEY, &serde_json::to_string(&records).unwrap());

        let log = BoundedEventLog::open(store, KEY, 5);
        assert_eq!(
            names(&log.stored()),
            vec!["event_3", "event_4", "event_5", "event_6", "event_7"]
        );
    }

    #[test]
    fn write_failure_keeps_memory_log() {
        let page = page();
        let mut log = BoundedEventLog::open(QuotaExceededStore, KEY, DEFAULT_CAPACITY);
        log.append(record(&page, 0));
        log.append(record(&page, 1));
        assert_eq!(log.len(), 2);
        // Nothing reached the store, so nothing is reported as persisted.
        assert!(log.stored().is_empty());
        assert_eq!(log.stored(), load_persisted(log.store(), KEY, DEFAULT_CAPACITY));
    }

    #[test]
    fn unreadable_store_falls_back_to_last_known_log() {
        let page = page();
        let mut log = BoundedEventLog::open(DisabledStore, KEY, DEFAULT_CAPACITY);
        assert!(log.is_empty());
        log.append(record(&page, 0));
        log.append(record(&page, 1));
        assert_eq!(log.len(), 2);
        assert_eq!(names(&log.stored()), vec!["event_0", "event_1"]);
    }

    /// Store shared between two logs, as local storage is between tabs.
    #[derive(Clone, Default)]
    struct SharedStore(Rc<RefCell<MemoryStore>>);

    impl KeyValueStore for SharedStore {
        fn get(&self, key: &str) -> Result<Option<String>, TelemetryError> {
            self.0.borrow().get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), TelemetryError> {
            self.0.borrow_mut().set(key, value)
        }
    }

    #[test]
    fn writes_from_other_tabs_are_kept() {
        let page = page();
        let shared = SharedStore::default();
        let mut tab_a = BoundedEventLog::open(shared.clone(), KEY, DEFAULT_CAPACITY);
        let mut tab_b = BoundedEventLog::open(shared.clone(), KEY, DEFAULT_CAPACITY);

        tab_a.append(record(&page, 0));
        tab_b.append(record(&page, 1));
        tab_a.append(record(&page, 2));

        let expected = vec!["event_0", "event_1", "event_2"];
        assert_eq!(names(&load_persisted(&shared, KEY, DEFAULT_CAPACITY)), expected);
        assert_eq!(names(&tab_a.stored()), expected);
        assert_eq!(names(&tab_b.stored()), expected);
        assert_eq!(names(&tab_a.all()), vec!["event_0", "event_2"]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let page = page();
        let mut log = BoundedEventLog::open(MemoryStore::new(), KEY, 0);
        log.append(record(&page, 0));
        log.append(record(&page, 1));
        assert_eq!(log.capacity(), 1);
        assert_eq!(names(&log.all()), vec!["event_1"]);
    }

    proptest! {
        /// After every append the log holds at most `capacity` records, and they
        /// are exactly the most recent ones in their original order.
        #[test]
        fn retains_most_recent_in_order(capacity in 1usize..20, appends in 0usize..60) {
            let page = page();
            let mut log = BoundedEventLog::open(MemoryStore::new(), KEY, capacity);

            for i in 0..appends {
                log.append(record(&page, i));
                prop_assert!(log.len() <= capacity);
                prop_assert!(log.stored().len() <= capacity);
            }

            let first_kept = appends.saturating_sub(capacity);
            let expected: Vec<String> = (first_kept..appends).map(|i| format!("event_{}", i)).collect();
            prop_assert_eq!(names(&log.all()), expected.clone());

            let persisted = load_persisted(log.store(), KEY, capacity);
            prop_assert_eq!(names(&persisted), expected);
        }
    }
}
