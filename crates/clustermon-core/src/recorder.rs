//! Thread-safe interval recorder
//!
//! The recorder owns the growing timeline and the store of last-known
//! resource snapshots. Every watcher task and the sampler task write
//! through a cloned [`Recorder`] handle; all mutation is serialized behind
//! one mutex, so no write is lost. Cross-task ordering is not preserved:
//! consumers get a sorted copy from [`Recorder::intervals`].
//!
//! Recording never fails. An [`IntervalHandle`] that does not name an open
//! interval is logged and ignored.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::interval::{Condition, EventInterval, Intervals};
use crate::resources::{ResourcesMap, WatchedResource};

/// Periodic probe producing level-triggered conditions
pub type Sampler = Arc<dyn Fn(DateTime<Utc>) -> Vec<Condition> + Send + Sync>;

/// Stable reference to an interval opened with [`Recorder::start_interval`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntervalHandle(usize);

#[derive(Debug, Clone)]
struct Entry {
    condition: Condition,
    from: DateTime<Utc>,
    /// `None` while the interval is still open
    to: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct RecorderInner {
    entries: Vec<Entry>,
    resources: ResourcesMap,
    samplers: Vec<Sampler>,
}

/// Shared handle to the run's timeline
#[derive(Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<RecorderInner>>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Recorder")
            .field("entries", &inner.entries.len())
            .field("resource_kinds", &inner.resources.len())
            .field("samplers", &inner.samplers.len())
            .finish()
    }
}

impl Recorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RecorderInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upsert the latest snapshot of a resource; produces no condition.
    pub fn record_resource(&self, resource: WatchedResource) {
        let kind = resource.kind().to_string();
        let key = resource.key();
        self.lock()
            .resources
            .entry(kind)
            .or_default()
            .insert(key, resource);
    }

    /// Append an instant at `at`.
    pub fn record_at(&self, at: DateTime<Utc>, condition: Condition) {
        self.lock().entries.push(Entry {
            condition,
            from: at,
            to: Some(at),
        });
    }

    /// Record several conditions observed at the same moment.
    pub fn record_all_at(&self, at: DateTime<Utc>, conditions: Vec<Condition>) {
        if conditions.is_empty() {
            return;
        }
        let mut inner = self.lock();
        inner
            .entries
            .extend(conditions.into_iter().map(|condition| Entry {
                condition,
                from: at,
                to: Some(at),
            }));
    }

    /// Append an open interval and return a handle to close it later.
    pub fn start_interval(&self, from: DateTime<Utc>, condition: Condition) -> IntervalHandle {
        let mut inner = self.lock();
        inner.entries.push(Entry {
            condition,
            from,
            to: None,
        });
        IntervalHandle(inner.entries.len() - 1)
    }

    /// Close an interval opened with [`Self::start_interval`].
    ///
    /// An unknown or already-closed handle is a logged no-op. An end before
    /// the start is clamped to the start.
    pub fn end_interval(&self, handle: IntervalHandle, to: DateTime<Utc>) {
        let mut inner = self.lock();
        match inner.entries.get_mut(handle.0) {
            Some(entry) if entry.to.is_none() => {
                entry.to = Some(to.max(entry.from));
            }
            Some(entry) => {
                warn!(
                    handle = handle.0,
                    locator = %entry.condition.locator,
                    "end_interval called on an interval that is already closed"
                );
            }
            None => {
                warn!(handle = handle.0, "end_interval called with an unknown handle");
            }
        }
    }

    /// Register a periodic probe; its results are recorded as instants.
    pub fn add_sampler(&self, sampler: Sampler) {
        self.lock().samplers.push(sampler);
    }

    /// Evaluate every sampler at `now` and record what they report.
    ///
    /// Samplers run without the recorder lock held.
    pub fn run_samplers(&self, now: DateTime<Utc>) -> usize {
        let samplers: Vec<Sampler> = self.lock().samplers.clone();
        let mut recorded = 0;
        for sampler in samplers {
            let conditions = sampler(now);
            recorded += conditions.len();
            self.record_all_at(now, conditions);
        }
        if recorded > 0 {
            debug!(count = recorded, "sampler conditions recorded");
        }
        recorded
    }

    /// Sorted copy of the timeline.
    ///
    /// `from`/`to` bound the returned entries when given; open intervals are
    /// reported as ending at the snapshot time (`to` if given, else now).
    #[must_use]
    pub fn intervals(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Intervals {
        let snapshot_at = to.unwrap_or_else(Utc::now);
        let entries = self.lock().entries.clone();
        let mut intervals: Intervals = entries
            .into_iter()
            .map(|entry| {
                let end = entry.to.unwrap_or(snapshot_at);
                EventInterval::new(entry.condition, entry.from, end)
            })
            .filter(|interval| {
                from.is_none_or(|start| interval.to() >= start)
                    && to.is_none_or(|end| interval.from() <= end)
            })
            .collect();
        intervals.sort();
        intervals
    }

    /// Owned snapshot of the last known state of every recorded resource.
    #[must_use]
    pub fn current_resource_state(&self) -> ResourcesMap {
        self.lock().resources.clone()
    }

    /// Number of recorded entries, open or closed
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Level;
    use crate::resources::Pod;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn record_at_appends_instants() {
        let recorder = Recorder::new();
        recorder.record_at(at(5), Condition::info("ns/a", "second"));
        recorder.record_at(at(1), Condition::info("ns/a", "first"));
        let intervals = recorder.intervals(None, Some(at(10)));
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].message(), "first");
        assert!(intervals.iter().all(|i| i.is_instant()));
    }

    #[test]
    fn start_and_end_interval() {
        let recorder = Recorder::new();
        let handle = recorder.start_interval(at(0), Condition::warning("ns/a", "held"));
        recorder.end_interval(handle, at(30));
        let intervals = recorder.intervals(None, None);
        assert_eq!(intervals[0].from(), at(0));
        assert_eq!(intervals[0].to(), at(30));
        assert_eq!(intervals[0].level(), Level::Warning);
    }

    #[test]
    fn end_interval_with_invalid_handle_is_noop() {
        let recorder = Recorder::new();
        recorder.end_interval(IntervalHandle(7), at(1));
        let handle = recorder.start_interval(at(0), Condition::info("l", "m"));
        recorder.end_interval(handle, at(3));
        recorder.end_interval(handle, at(9));
        let intervals = recorder.intervals(None, None);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].to(), at(3));
    }

    #[test]
    fn end_before_start_is_clamped() {
        let recorder = Recorder::new();
        let handle = recorder.start_interval(at(10), Condition::info("l", "m"));
        recorder.end_interval(handle, at(2));
        let intervals = recorder.intervals(None, None);
        assert_eq!(intervals[0].to(), at(10));
    }

    #[test]
    fn open_intervals_end_at_snapshot_time() {
        let recorder = Recorder::new();
        recorder.start_interval(at(0), Condition::info("l", "open"));
        let intervals = recorder.intervals(None, Some(at(20)));
        assert_eq!(intervals[0].to(), at(20));
    }

    #[test]
    fn intervals_are_bounded_by_window() {
        let recorder = Recorder::new();
        recorder.record_at(at(1), Condition::info("l", "early"));
        recorder.record_at(at(50), Condition::info("l", "inside"));
        recorder.record_at(at(200), Condition::info("l", "late"));
        let intervals = recorder.intervals(Some(at(10)), Some(at(100)));
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].message(), "inside");
    }

    #[test]
    fn samplers_record_at_tick_time() {
        let recorder = Recorder::new();
        recorder.add_sampler(Arc::new(|now| {
            vec![Condition::warning("ns/a pod/b", format!("tick {}", now.timestamp()))]
        }));
        assert_eq!(recorder.run_samplers(at(3)), 1);
        let intervals = recorder.intervals(None, Some(at(10)));
        assert_eq!(intervals[0].from(), at(3));
    }

    #[test]
    fn record_resource_upserts_by_key() {
        let recorder = Recorder::new();
        let mut pod = Pod::default();
        pod.metadata.namespace = "ns".to_string();
        pod.metadata.name = "p".to_string();
        pod.metadata.resource_version = "1".to_string();
        recorder.record_resource(pod.clone().into());
        pod.metadata.resource_version = "2".to_string();
        recorder.record_resource(pod.into());

        let state = recorder.current_resource_state();
        let pods = &state["pods"];
        assert_eq!(pods.len(), 1);
        assert_eq!(pods["ns/p"].metadata().resource_version, "2");
        assert!(recorder.is_empty());
    }

    #[test]
    fn concurrent_writers_lose_nothing() {
        let recorder = Recorder::new();
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let recorder = recorder.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        recorder.record_at(at(i), Condition::info(format!("t/{t}"), "m"));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(recorder.len(), 800);
    }
}
