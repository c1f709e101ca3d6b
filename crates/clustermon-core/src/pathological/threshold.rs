//! Per-pattern repeat thresholds
//!
//! Some repeats are allowed by the classifier but still get their own
//! check: a handful of occurrences is fine, more is a flake, many is a
//! failure.

use regex::Regex;
use std::sync::LazyLock;

use crate::interval::{EventInterval, Intervals};
use crate::locator::is_in_e2e_namespace;
use crate::pathological::patterns::{
    BACKOFF_RESTARTING_FAILED, ERROR_UPDATING_ENDPOINT_SLICES, IMAGE_PULL_REDHAT,
    NODE_HAS_NO_DISK_PRESSURE, NODE_HAS_SUFFICIENT_MEMORY, NODE_HAS_SUFFICIENT_PID,
    REQUIRED_RESOURCES_MISSING, extract_count, static_regex,
};
use crate::verdict::Verdict;

const DEFAULT_FLAKE_THRESHOLD: u32 = 10;
const DEFAULT_FAIL_THRESHOLD: u32 = 20;

/// Which intervals a threshold check looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceScope {
    All,
    Core,
    EndToEnd,
}

impl NamespaceScope {
    fn admits(self, interval: &EventInterval) -> bool {
        match self {
            Self::All => true,
            Self::Core => !is_in_e2e_namespace(interval.locator()),
            Self::EndToEnd => is_in_e2e_namespace(interval.locator()),
        }
    }
}

/// A named check over one repeat pattern
#[derive(Debug)]
pub struct ThresholdCheck {
    pub name: &'static str,
    pub pattern: Regex,
    pub scope: NamespaceScope,
    /// Counts above this are reported as a flake
    pub flake_above: u32,
    /// Counts above this fail; `None` never fails
    pub fail_above: Option<u32>,
}

impl ThresholdCheck {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            pattern: static_regex(pattern),
            scope: NamespaceScope::All,
            flake_above: DEFAULT_FLAKE_THRESHOLD,
            fail_above: Some(DEFAULT_FAIL_THRESHOLD),
        }
    }

    fn thresholds(mut self, flake_above: u32, fail_above: Option<u32>) -> Self {
        self.flake_above = flake_above;
        self.fail_above = fail_above;
        self
    }

    fn scoped(mut self, scope: NamespaceScope) -> Self {
        self.scope = scope;
        self
    }

    /// Verdicts for this check over the whole timeline
    #[must_use]
    pub fn evaluate(&self, intervals: &Intervals) -> Vec<Verdict> {
        let mut failures = Vec::new();
        let mut flakes = Vec::new();

        for interval in intervals.iter().filter(|i| self.scope.admits(i)) {
            let display = interval.display_text();
            if !self.pattern.is_match(&display) {
                continue;
            }
            let (_, times) = extract_count(&display);
            let line = format!("event [{display}] happened {times} times");
            if self.fail_above.is_some_and(|fail| times > fail) {
                failures.push(line);
            } else if times > self.flake_above {
                flakes.push(line);
            }
        }

        if !failures.is_empty() {
            failures.extend(flakes);
            return vec![Verdict::fail(self.name, failures.join("\n"))];
        }
        if !flakes.is_empty() {
            return Verdict::flake(self.name, flakes.join("\n"));
        }
        vec![Verdict::pass(self.name)]
    }
}

/// Every threshold check, in report order
pub static THRESHOLD_CHECKS: LazyLock<Vec<ThresholdCheck>> = LazyLock::new(|| {
    vec![
        ThresholdCheck::new(
            "[sig-arch] should not see excessive pull back-off on registry.redhat.io",
            IMAGE_PULL_REDHAT,
        )
        .thresholds(5, Some(8)),
        ThresholdCheck::new(
            "[sig-cluster-lifecycle] should not see excessive RequiredInstallerResourcesMissing secrets",
            REQUIRED_RESOURCES_MISSING,
        ),
        ThresholdCheck::new(
            "[sig-cluster-lifecycle] should not see excessive Back-off restarting failed containers",
            BACKOFF_RESTARTING_FAILED,
        )
        .scoped(NamespaceScope::Core),
        ThresholdCheck::new(
            "[sig-cluster-lifecycle] should not see excessive Back-off restarting failed containers in e2e namespaces",
            BACKOFF_RESTARTING_FAILED,
        )
        .scoped(NamespaceScope::EndToEnd)
        .thresholds(DEFAULT_FLAKE_THRESHOLD, None),
        ThresholdCheck::new(
            "[sig-networking] should not see excessive FailedToUpdateEndpointSlices Error updating Endpoint Slices",
            ERROR_UPDATING_ENDPOINT_SLICES,
        ),
        ThresholdCheck::new(
            "[sig-node] Test the NodeHasNoDiskPressure condition does not occur too often",
            NODE_HAS_NO_DISK_PRESSURE,
        ),
        ThresholdCheck::new(
            "[sig-node] Test the NodeHasSufficientMemory condition does not occur too often",
            NODE_HAS_SUFFICIENT_MEMORY,
        ),
        ThresholdCheck::new(
            "[sig-node] Test the NodeHasSufficientPID condition does not occur too often",
            NODE_HAS_SUFFICIENT_PID,
        ),
    ]
});

/// Run every threshold check.
#[must_use]
pub fn run_threshold_checks(intervals: &Intervals) -> Vec<Verdict> {
    THRESHOLD_CHECKS
        .iter()
        .flat_map(|check| check.evaluate(intervals))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Condition;
    use crate::verdict::{Outcome, outcome_of};
    use chrono::{TimeZone, Utc};

    const BACKOFF_CORE: &str =
        "[sig-cluster-lifecycle] should not see excessive Back-off restarting failed containers";
    const BACKOFF_E2E: &str = "[sig-cluster-lifecycle] should not see excessive Back-off restarting failed containers in e2e namespaces";

    fn backoff(namespace: &str, count: u32) -> Intervals {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        vec![EventInterval::instant(
            Condition::warning(
                format!("ns/{namespace} pod/web-1 node/w1"),
                format!("reason/BackOff Back-off restarting failed container ({count} times)"),
            ),
            at,
        )]
        .into()
    }

    #[test]
    fn table_is_complete() {
        assert_eq!(THRESHOLD_CHECKS.len(), 8);
        let verdicts = run_threshold_checks(&Intervals::new());
        assert_eq!(verdicts.len(), 8);
        assert!(verdicts.iter().all(|v| !v.is_failure()));
    }

    #[test]
    fn backoff_below_flake_threshold_passes() {
        let verdicts = run_threshold_checks(&backoff("openshift-etcd", 5));
        assert_eq!(outcome_of(&verdicts, BACKOFF_CORE), Some(Outcome::Pass));
    }

    #[test]
    fn backoff_above_flake_threshold_flakes() {
        let verdicts = run_threshold_checks(&backoff("openshift-etcd", 11));
        assert_eq!(outcome_of(&verdicts, BACKOFF_CORE), Some(Outcome::Flake));
    }

    #[test]
    fn backoff_above_fail_threshold_fails_once() {
        let verdicts = run_threshold_checks(&backoff("openshift-etcd", 56));
        let named: Vec<_> = verdicts.iter().filter(|v| v.name == BACKOFF_CORE).collect();
        assert_eq!(named.len(), 1);
        assert!(named[0].is_failure());
        assert!(
            named[0]
                .failure
                .as_deref()
                .unwrap()
                .contains("happened 56 times")
        );
    }

    #[test]
    fn e2e_backoff_never_fails() {
        let verdicts = run_threshold_checks(&backoff("e2e-test-1", 56));
        assert_eq!(outcome_of(&verdicts, BACKOFF_E2E), Some(Outcome::Flake));
        assert_eq!(outcome_of(&verdicts, BACKOFF_CORE), Some(Outcome::Pass));
    }

    #[test]
    fn failure_lists_flakes_too() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let locator = "ns/openshift-etcd-operator deployment/etcd-operator";
        let intervals: Intervals = [30, 12]
            .into_iter()
            .map(|count| {
                EventInterval::instant(
                    Condition::warning(
                        locator,
                        format!(
                            "reason/RequiredInstallerResourcesMissing secrets: etcd-all-certs-3 ({count} times)"
                        ),
                    ),
                    at,
                )
            })
            .collect();
        let name = "[sig-cluster-lifecycle] should not see excessive RequiredInstallerResourcesMissing secrets";
        let verdicts = run_threshold_checks(&intervals);
        assert_eq!(outcome_of(&verdicts, name), Some(Outcome::Fail));
        let failure = verdicts
            .iter()
            .find(|v| v.name == name)
            .and_then(|v| v.failure.as_deref())
            .unwrap();
        assert_eq!(failure.lines().count(), 2);
    }
}
