//! Repeated event classifier
//!
//! One [`ClassifierConfig`] is built per run once cluster metadata is
//! known and is passed by reference to the ingest path (online) and to the
//! end-of-run checks (offline).

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cluster::{ClusterInfo, Topology};
use crate::config::{ClassifierSettings, RunMode};
use crate::interval::{Condition, EventInterval, Intervals};
use crate::locator::is_in_e2e_namespace;
use crate::pathological::known::{KNOWN_EVENT_PROBLEMS, KnownProblem};
use crate::pathological::patterns::{
    BASE_PATTERNS, KNOWN_LABEL, NEW_LABEL, UPGRADE_PATTERNS, extract_count, has_repeat_shape,
    hashed_locator, labeled,
};
use crate::pathological::predicates::AllowancePredicate;
use crate::verdict::Verdict;

/// Check over core platform namespaces
pub const CORE_CHECK_NAME: &str = "[sig-arch] events should not repeat pathologically";
/// Check over end-to-end test namespaces
pub const E2E_CHECK_NAME: &str = "[sig-arch] events should not repeat pathologically in e2e namespaces";

/// Why a repeat was accepted or rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allowance {
    /// Matched a static allow pattern
    Pattern,
    /// A predicate returned true
    Predicate(&'static str),
    /// Nothing explains the repeat
    Denied,
}

impl Allowance {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Denied)
    }
}

/// Where the ingest path records a fresh event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// An explained repeat: labeled known and widened to one second
    Known,
    /// An unexplained repeat above the threshold: labeled new and widened
    New,
    /// A plain instant
    Plain,
}

impl Placement {
    /// Apply this placement's label to a condition.
    ///
    /// New repeats also get an `hmsg/<hash>` locator token so the backfill
    /// can find their earlier occurrences.
    #[must_use]
    pub fn label(self, mut condition: Condition) -> Condition {
        match self {
            Self::Known => {
                condition.message = labeled(KNOWN_LABEL, &condition.message);
            }
            Self::New => {
                condition.message = labeled(NEW_LABEL, &condition.message);
                condition.locator = hashed_locator(&condition.locator, &condition.message);
            }
            Self::Plain => {}
        }
        condition
    }

    #[must_use]
    pub fn is_widened(self) -> bool {
        !matches!(self, Self::Plain)
    }
}

/// Patterns, predicates and scoping for one run
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    allowed_patterns: Vec<Regex>,
    predicates: Vec<AllowancePredicate>,
    known_problems: &'static [KnownProblem],
    cluster: Arc<ClusterInfo>,
    pub threshold: u32,
    pub test_suite: String,
}

impl ClassifierConfig {
    /// Evaluator for the end-of-run checks.
    ///
    /// Stable runs tolerate etcd guard probe failures per revision; upgrade
    /// runs allow the upgrade-only patterns. Single-replica clusters also
    /// tolerate connection-refused probe errors under the single-node
    /// threshold.
    #[must_use]
    pub fn for_run(mode: RunMode, cluster: Arc<ClusterInfo>, settings: &ClassifierSettings) -> Self {
        let mut allowed_patterns = BASE_PATTERNS.clone();
        let mut predicates = AllowancePredicate::BASE.to_vec();
        match mode {
            RunMode::Stable => predicates.push(AllowancePredicate::EtcdGuardRevisionChange {
                max_revision: cluster.etcd_max_revision,
            }),
            RunMode::Upgrade => allowed_patterns.extend(UPGRADE_PATTERNS.iter().cloned()),
        }
        if cluster.topology == Topology::SingleReplica {
            predicates.push(AllowancePredicate::SingleNodeConnectionRefused {
                threshold: settings.single_node_threshold,
            });
        }
        debug!(
            ?mode,
            patterns = allowed_patterns.len(),
            predicates = predicates.len(),
            "classifier configured"
        );
        Self {
            allowed_patterns,
            predicates,
            known_problems: &KNOWN_EVENT_PROBLEMS,
            cluster,
            threshold: settings.threshold,
            test_suite: settings.test_suite.clone(),
        }
    }

    /// Evaluator for the ingest path.
    ///
    /// Every static pattern counts as allowed here, known problems
    /// included, and the single-node predicate is always registered.
    #[must_use]
    pub fn online(cluster: Arc<ClusterInfo>, settings: &ClassifierSettings) -> Self {
        let mut allowed_patterns = BASE_PATTERNS.clone();
        allowed_patterns.extend(UPGRADE_PATTERNS.iter().cloned());
        allowed_patterns.extend(KNOWN_EVENT_PROBLEMS.iter().map(|kp| kp.pattern.clone()));
        let mut predicates = AllowancePredicate::BASE.to_vec();
        predicates.push(AllowancePredicate::SingleNodeConnectionRefused {
            threshold: settings.single_node_threshold,
        });
        Self {
            allowed_patterns,
            predicates,
            known_problems: &KNOWN_EVENT_PROBLEMS,
            cluster,
            threshold: settings.threshold,
            test_suite: settings.test_suite.clone(),
        }
    }

    #[must_use]
    pub fn predicates(&self) -> &[AllowancePredicate] {
        &self.predicates
    }

    #[must_use]
    pub fn cluster(&self) -> &ClusterInfo {
        &self.cluster
    }

    /// Whether `text` matches any allow pattern
    #[must_use]
    pub fn matches_allowed_pattern(&self, text: &str) -> bool {
        self.allowed_patterns.iter().any(|p| p.is_match(text))
    }

    /// Bug references of every known problem that applies to `text`
    #[must_use]
    pub fn known_bugs(&self, text: &str) -> Vec<&'static str> {
        self.known_problems
            .iter()
            .filter(|kp| {
                kp.applies(
                    text,
                    &self.cluster.platform,
                    self.cluster.topology,
                    &self.test_suite,
                )
            })
            .map(|kp| kp.bug)
            .collect()
    }

    /// Online decision for a freshly ingested event.
    ///
    /// A predicate error stops evaluation and counts as not allowed.
    #[must_use]
    pub fn place(&self, condition: &Condition, count: i32) -> Placement {
        let text = condition.display_text();
        let times = u32::try_from(count).unwrap_or(0);
        if times > 1 && (self.matches_allowed_pattern(&text) || self.allowed_online(condition, times)) {
            return Placement::Known;
        }
        if times > self.threshold && has_repeat_shape(&text) {
            return Placement::New;
        }
        Placement::Plain
    }

    fn allowed_online(&self, condition: &Condition, times: u32) -> bool {
        for predicate in &self.predicates {
            match predicate.decide(condition, times, &self.cluster) {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => {
                    warn!(
                        error = %err,
                        locator = %condition.locator,
                        "error processing pathological event"
                    );
                    return false;
                }
            }
        }
        false
    }

    // =========================================================================
    // Offline checks
    // =========================================================================

    /// Repeats outside end-to-end namespaces
    #[must_use]
    pub fn check_core_namespaces(&self, intervals: &Intervals) -> Vec<Verdict> {
        let core = intervals.filter(|i| !is_in_e2e_namespace(i.locator()));
        self.check_repeats(CORE_CHECK_NAME, false, &core)
    }

    /// Repeats inside end-to-end namespaces; never worse than a flake.
    ///
    /// Every violation is downgraded, with or without a known problem, so a
    /// genuine regression in a test namespace cannot fail the run.
    #[must_use]
    pub fn check_e2e_namespaces(&self, intervals: &Intervals) -> Vec<Verdict> {
        let e2e = intervals.filter(|i| is_in_e2e_namespace(i.locator()));
        self.check_repeats(E2E_CHECK_NAME, true, &e2e)
    }

    /// Both repeat checks
    #[must_use]
    pub fn check_all(&self, intervals: &Intervals) -> Vec<Verdict> {
        let mut verdicts = self.check_core_namespaces(intervals);
        verdicts.extend(self.check_e2e_namespaces(intervals));
        verdicts
    }

    /// Offline allowance: patterns first, then predicates in order. Each
    /// predicate error is reported in `failures` and evaluation continues.
    fn allowed_offline(
        &self,
        interval: &EventInterval,
        text: &str,
        times: u32,
        failures: &mut Vec<String>,
    ) -> Allowance {
        if self.matches_allowed_pattern(text) {
            return Allowance::Pattern;
        }
        for predicate in &self.predicates {
            match predicate.decide(&interval.condition, times, &self.cluster) {
                Ok(true) => return Allowance::Predicate(predicate.name()),
                Ok(false) => {}
                Err(err) => {
                    failures.push(format!("error: [{err}] when processing event {text}"));
                }
            }
        }
        Allowance::Denied
    }

    fn check_repeats(&self, name: &str, flake_only: bool, intervals: &Intervals) -> Vec<Verdict> {
        struct Violation<'a> {
            count: u32,
            text: &'a str,
        }

        let mut failures = Vec::new();
        let displays: Vec<String> = intervals.iter().map(EventInterval::display_text).collect();
        let mut violations: BTreeMap<String, Violation<'_>> = BTreeMap::new();

        for (interval, display) in intervals.iter().zip(&displays) {
            let (text, times) = extract_count(display);
            if times <= self.threshold {
                continue;
            }
            if self
                .allowed_offline(interval, text, times, &mut failures)
                .is_allowed()
            {
                continue;
            }
            let key = format!(
                "{text} From: {} To: {}",
                interval.from().format("%H:%M:%SZ"),
                interval.to().format("%H:%M:%SZ")
            );
            violations
                .entry(key)
                .and_modify(|v| v.count = v.count.max(times))
                .or_insert(Violation { count: times, text });
        }

        let mut flakes = Vec::new();
        for (key, violation) in &violations {
            let mut message = format!(
                "event happened {} times, something is wrong: {key}",
                violation.count
            );
            let bugs = self.known_bugs(violation.text);
            for bug in &bugs {
                message.push_str(" - ");
                message.push_str(bug);
            }
            if !bugs.is_empty() || flake_only {
                flakes.push(append_to_first_line(&message, " result=allow "));
            } else {
                failures.push(append_to_first_line(&message, " result=reject "));
            }
        }

        let mut verdicts = Vec::new();
        if !failures.is_empty() || !flakes.is_empty() {
            let mut output = String::new();
            if !failures.is_empty() {
                output = format!(
                    "{} events happened too frequently\n\n{}",
                    failures.len(),
                    failures.join("\n")
                );
            }
            if !flakes.is_empty() {
                if !output.is_empty() {
                    output.push_str("\n\n");
                }
                let _ = write!(
                    output,
                    "{} events with known BZs\n\n{}",
                    flakes.len(),
                    flakes.join("\n")
                );
            }
            verdicts.push(Verdict::fail(name, output));
        }
        if verdicts.is_empty() || failures.is_empty() {
            verdicts.push(Verdict::pass(name));
        }
        verdicts
    }
}

fn append_to_first_line(text: &str, suffix: &str) -> String {
    match text.split_once('\n') {
        Some((first, rest)) => format!("{first}{suffix}\n{rest}"),
        None => format!("{text}{suffix}"),
    }
}
