//! Interval timeline model
//!
//! A [`Condition`] is one semantic observation about a resource. An
//! [`EventInterval`] anchors a condition in time: `from == to` is an
//! instant, `to > from` a condition held over a span. [`Intervals`] is the
//! ordered timeline the recorder produces and every later phase consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::locator;

/// Severity of a condition
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Level {
    #[default]
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("Info"),
            Self::Warning => f.write_str("Warning"),
            Self::Error => f.write_str("Error"),
        }
    }
}

/// Well-known `reason/<Reason>` values emitted by the detectors
pub mod reason {
    pub const CREATED: &str = "Created";
    pub const SCHEDULED: &str = "Scheduled";
    pub const DELETED: &str = "Deleted";
    pub const DELETED_BEFORE_SCHEDULING: &str = "DeletedBeforeScheduling";
    pub const DELETED_AFTER_COMPLETION: &str = "DeletedAfterCompletion";
    pub const GRACEFUL_DELETE: &str = "GracefulDelete";
    pub const FORCE_DELETE: &str = "ForceDelete";
    pub const CONTAINER_WAIT: &str = "ContainerWait";
    pub const CONTAINER_START: &str = "ContainerStart";
    pub const CONTAINER_EXIT: &str = "ContainerExit";
    pub const READY: &str = "Ready";
    pub const NOT_READY: &str = "NotReady";
    pub const RESTARTED: &str = "Restarted";
    pub const TERMINATION_STATE_CLEARED: &str = "TerminationStateCleared";
    pub const EVICTED: &str = "Evicted";
    pub const PREEMPTED: &str = "Preempted";
    pub const FAILED: &str = "Failed";
}

/// Render `reason/<reason>` optionally followed by a detail string.
#[must_use]
pub fn reasoned_message(reason: &str, detail: &str) -> String {
    if detail.is_empty() {
        format!("reason/{reason}")
    } else {
        format!("reason/{reason} {detail}")
    }
}

/// A semantic observation about one or more resources
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub level: Level,
    /// Ordered `kind/name` tokens, e.g. `ns/x pod/y node/z`
    pub locator: String,
    pub message: String,
}

impl Condition {
    #[must_use]
    pub fn new(level: Level, locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            locator: locator.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn info(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Info, locator, message)
    }

    #[must_use]
    pub fn warning(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Warning, locator, message)
    }

    #[must_use]
    pub fn error(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Error, locator, message)
    }

    /// `"<locator> - <message>"`, the text patterns are matched against
    #[must_use]
    pub fn display_text(&self) -> String {
        format!("{} - {}", self.locator, self.message)
    }
}

/// A condition anchored in time; `to >= from` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireInterval", into = "WireInterval")]
pub struct EventInterval {
    pub condition: Condition,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct WireInterval {
    level: Level,
    locator: String,
    message: String,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl TryFrom<WireInterval> for EventInterval {
    type Error = String;

    fn try_from(wire: WireInterval) -> Result<Self, Self::Error> {
        if wire.to < wire.from {
            return Err(format!(
                "interval ends before it starts: from {} to {}",
                wire.from.to_rfc3339(),
                wire.to.to_rfc3339()
            ));
        }
        Ok(Self {
            condition: Condition::new(wire.level, wire.locator, wire.message),
            from: wire.from,
            to: wire.to,
        })
    }
}

impl From<EventInterval> for WireInterval {
    fn from(interval: EventInterval) -> Self {
        Self {
            level: interval.condition.level,
            locator: interval.condition.locator,
            message: interval.condition.message,
            from: interval.from,
            to: interval.to,
        }
    }
}

impl EventInterval {
    /// Create an interval; an end earlier than the start collapses to an instant.
    #[must_use]
    pub fn new(condition: Condition, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            condition,
            from,
            to: to.max(from),
        }
    }

    /// A zero-duration observation
    #[must_use]
    pub fn instant(condition: Condition, at: DateTime<Utc>) -> Self {
        Self {
            condition,
            from: at,
            to: at,
        }
    }

    #[must_use]
    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    #[must_use]
    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    #[must_use]
    pub fn is_instant(&self) -> bool {
        self.from == self.to
    }

    #[must_use]
    pub fn level(&self) -> Level {
        self.condition.level
    }

    #[must_use]
    pub fn locator(&self) -> &str {
        &self.condition.locator
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.condition.message
    }

    #[must_use]
    pub fn display_text(&self) -> String {
        self.condition.display_text()
    }

    fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.to >= start && self.from <= end
    }

    fn clamp_to(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        if self.from < start {
            self.from = start;
        }
        if self.to > end {
            self.to = end;
        }
        if self.to < self.from {
            self.to = self.from;
        }
    }

    fn time_order(&self, other: &Self) -> Ordering {
        self.from
            .cmp(&other.from)
            .then_with(|| self.to.cmp(&other.to))
            .then_with(|| self.condition.locator.cmp(&other.condition.locator))
            .then_with(|| self.condition.message.cmp(&other.condition.message))
    }
}

impl fmt::Display for EventInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} {} {}",
            self.from.format("%b %d %H:%M:%S%.3f"),
            self.to.format("%b %d %H:%M:%S%.3f"),
            self.condition.level,
            self.condition.display_text()
        )
    }
}

/// Ordered sequence of intervals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Intervals(Vec<EventInterval>);

impl Intervals {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, interval: EventInterval) {
        self.0.push(interval);
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<EventInterval> {
        self.0
    }

    /// Stable sort by `from`, then `to`, then locator, then message.
    pub fn sort(&mut self) {
        self.0.sort_by(EventInterval::time_order);
    }

    /// Order-preserving copy of the entries accepted by `predicate`.
    #[must_use]
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(&EventInterval) -> bool,
    {
        self.0.iter().filter(|i| predicate(i)).cloned().collect()
    }

    /// Entries overlapping `[start, end]`, truncated to that window.
    #[must_use]
    pub fn cut(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.0
            .iter()
            .filter(|i| i.overlaps(start, end))
            .cloned()
            .map(|mut i| {
                i.clamp_to(start, end);
                i
            })
            .collect()
    }

    /// Truncate every entry in place to `[start, end]`.
    pub fn clamp(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        for interval in &mut self.0 {
            interval.clamp_to(start, end);
        }
    }

    /// Copy ordered by namespace first (entries without one last), then time.
    #[must_use]
    pub fn for_namespaced_display(&self) -> Self {
        let mut sorted = self.0.clone();
        sorted.sort_by(|a, b| {
            let ns_a = locator::namespace(a.locator());
            let ns_b = locator::namespace(b.locator());
            ns_a.is_none()
                .cmp(&ns_b.is_none())
                .then_with(|| ns_a.cmp(&ns_b))
                .then_with(|| a.time_order(b))
        });
        Self(sorted)
    }

    /// Count of entries at the given level
    #[must_use]
    pub fn count_level(&self, level: Level) -> usize {
        self.0.iter().filter(|i| i.level() == level).count()
    }
}

impl Deref for Intervals {
    type Target = [EventInterval];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Intervals {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<EventInterval> for Intervals {
    fn from_iter<T: IntoIterator<Item = EventInterval>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<EventInterval> for Intervals {
    fn extend<T: IntoIterator<Item = EventInterval>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Intervals {
    type Item = EventInterval;
    type IntoIter = std::vec::IntoIter<EventInterval>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Intervals {
    type Item = &'a EventInterval;
    type IntoIter = std::slice::Iter<'a, EventInterval>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<EventInterval>> for Intervals {
    fn from(v: Vec<EventInterval>) -> Self {
        Self(v)
    }
}
