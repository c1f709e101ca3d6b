//! Cluster event detector
//!
//! Turns one cluster `Event` object into a [`Condition`] plus the
//! timestamps the recorder needs to place it. Stale events (replayed by a
//! fresh list or written late by test jobs) are dropped here.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::fmt::Write;
use std::sync::LazyLock;

use crate::interval::{Condition, Level};
use crate::locator::locate_event;
use crate::resources::Event;

/// First quoted token, optionally followed by ` in <duration>` at the end.
static FIRST_QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)"( in (\d+(\.\d+)?(s|ms)$))?"#).unwrap());

/// Width in seconds of the synthetic interval a repeated event is widened to
pub const PATHOLOGICAL_SPAN_SECS: i64 = 1;

/// A fresh event rendered as a condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventObservation {
    pub condition: Condition,
    /// Newest timestamp of the event; plain instants are recorded here
    pub observed_at: DateTime<Utc>,
    /// Oldest timestamp of the event; widened intervals start here
    pub first_observed_at: DateTime<Utc>,
    /// Repeat count reported by the emitter
    pub count: i32,
}

impl EventObservation {
    /// `[first_observed_at, first_observed_at + 1s]`
    #[must_use]
    pub fn pathological_window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.first_observed_at,
            self.first_observed_at + Duration::seconds(PATHOLOGICAL_SPAN_SECS),
        )
    }

    /// Repeated more than once by the emitter
    #[must_use]
    pub fn is_repeat(&self) -> bool {
        self.count > 1
    }
}

/// Container name from a `spec.containers{x}` or `spec.initContainers{x}` field path
#[must_use]
pub fn event_for_container(field_path: &str) -> Option<&str> {
    let inner = field_path.strip_suffix('}')?;
    inner
        .strip_prefix("spec.containers{")
        .or_else(|| inner.strip_prefix("spec.initContainers{"))
}

/// Render an event.
///
/// Returns `None` when the newest timestamp is older than `now - window`,
/// or when the event carries no timestamp at all. `node_roles` is the role
/// list of the involved node, when the involved object is a readable node.
#[must_use]
pub fn observe_event(
    event: &Event,
    now: DateTime<Utc>,
    window: Duration,
    node_roles: Option<&str>,
) -> Option<EventObservation> {
    let observed_at = event.observed_at()?;
    if observed_at < now - window {
        return None;
    }
    let first_observed_at = event.first_observed_at().unwrap_or(observed_at);

    let mut body = event.message.clone();
    if event.count > 1 {
        let _ = write!(body, " ({} times)", event.count);
    }
    if event.involved_object.kind == "Node" {
        if let Some(roles) = node_roles {
            body = format!("roles/{roles} {body}");
        }
    }

    let level = if event.is_warning() {
        Level::Warning
    } else {
        Level::Info
    };

    Some(EventObservation {
        condition: Condition::new(level, locate_event(event), render_message(event, body)),
        observed_at,
        first_observed_at,
        count: event.count,
    })
}

fn render_message(event: &Event, body: String) -> String {
    let reason = event.reason.as_str();
    let container = (event.involved_object.kind == "Pod")
        .then(|| event_for_container(&event.involved_object.field_path))
        .flatten();

    match (reason, container) {
        ("", _) => body,
        ("Killing", Some(container)) => format!("container/{container} reason/{reason}"),
        ("Pulling" | "Pulled", Some(container)) => match FIRST_QUOTE.captures(&event.message) {
            Some(caps) => {
                let image = caps.get(1).map_or("", |m| m.as_str());
                match caps.get(3).and_then(|d| parse_duration_secs(d.as_str())) {
                    Some(secs) => format!(
                        "container/{container} reason/{reason} duration/{secs:.3}s image/{image}"
                    ),
                    None => format!("container/{container} reason/{reason} image/{image}"),
                }
            }
            None => format!("reason/{reason} {body}"),
        },
        _ => format!("reason/{reason} {body}"),
    }
}

/// `1.5s` / `250ms` → seconds
fn parse_duration_secs(text: &str) -> Option<f64> {
    if let Some(ms) = text.strip_suffix("ms") {
        return ms.parse::<f64>().ok().map(|v| v / 1000.0);
    }
    text.strip_suffix('s')?.parse::<f64>().ok()
}
