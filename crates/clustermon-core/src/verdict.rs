//! Named check results
//!
//! A check reports one or more [`Verdict`]s under a single name. A lone
//! passing verdict is a pass, a lone failing verdict a failure, and a
//! failing plus a passing verdict with the same name is a flake.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::interval::{Intervals, Level};

/// Name of the check that flags Error-level intervals
pub const MONITOR_CHECK_NAME: &str = "[sig-arch] Monitor cluster while tests execute";

/// Outcome of a named check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub name: String,
    /// Present when this verdict fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Verdict {
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure: None,
        }
    }

    #[must_use]
    pub fn fail(name: impl Into<String>, failure: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure: Some(failure.into()),
        }
    }

    /// A failing and a passing verdict under the same name
    #[must_use]
    pub fn flake(name: &str, failure: impl Into<String>) -> Vec<Self> {
        vec![Self::fail(name, failure), Self::pass(name)]
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Aggregate outcome of every verdict sharing a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Pass,
    Flake,
    Fail,
}

/// Outcome of the check called `name`, if any verdict carries that name
#[must_use]
pub fn outcome_of(verdicts: &[Verdict], name: &str) -> Option<Outcome> {
    let mut failed = false;
    let mut passed = false;
    for verdict in verdicts.iter().filter(|v| v.name == name) {
        if verdict.is_failure() {
            failed = true;
        } else {
            passed = true;
        }
    }
    match (failed, passed) {
        (false, false) => None,
        (true, true) => Some(Outcome::Flake),
        (true, false) => Some(Outcome::Fail),
        (false, true) => Some(Outcome::Pass),
    }
}

/// Flake when any Error-level interval exists, else pass.
///
/// Error-level intervals are reported as a flake because the monitor
/// cannot tell whether they were caused by the tests themselves.
#[must_use]
pub fn check_error_level(intervals: &Intervals) -> Vec<Verdict> {
    let errors: Vec<_> = intervals
        .iter()
        .filter(|i| i.level() == Level::Error)
        .collect();
    if errors.is_empty() {
        return vec![Verdict::pass(MONITOR_CHECK_NAME)];
    }

    let mut output = format!(
        "{} error level events were detected during this test run:\n\n",
        errors.len()
    );
    for interval in errors {
        let _ = writeln!(output, "{interval}");
    }
    Verdict::flake(MONITOR_CHECK_NAME, output)
}
