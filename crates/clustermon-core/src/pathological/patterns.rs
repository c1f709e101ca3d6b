//! Static repeat patterns, labels and count helpers

use regex::Regex;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::sync::LazyLock;

/// Marks a repeat whose count crossed the threshold
pub const PATHOLOGICAL_MARK: &str = "pathological/true";
/// Marks a repeat the classifier already explains
pub const INTERESTING_MARK: &str = "interesting/true";
/// Label prefixed to repeats explained by an allow pattern or predicate
pub const KNOWN_LABEL: &str = "pathological/true interesting/true";
/// Label prefixed to unexplained repeats above the threshold
pub const NEW_LABEL: &str = PATHOLOGICAL_MARK;

/// Number of hex digits kept from the message hash
const HASH_DIGITS: usize = 10;

// =============================================================================
// Patterns shared with the threshold checks
// =============================================================================

pub const IMAGE_PULL_REDHAT: &str = r"reason/[a-zA-Z]+ .*Back-off pulling image .*registry.redhat.io";
pub const REQUIRED_RESOURCES_MISSING: &str =
    r"reason/RequiredInstallerResourcesMissing secrets: etcd-all-certs-[0-9]+";
pub const BACKOFF_RESTARTING_FAILED: &str = r"reason/BackOff Back-off restarting failed container";
pub const ERROR_UPDATING_ENDPOINT_SLICES: &str =
    r"reason/FailedToUpdateEndpointSlices Error updating Endpoint Slices";
pub const NODE_HAS_NO_DISK_PRESSURE: &str =
    r"reason/NodeHasNoDiskPressure.*status is now: NodeHasNoDiskPressure";
pub const NODE_HAS_SUFFICIENT_MEMORY: &str =
    r"reason/NodeHasSufficientMemory.*status is now: NodeHasSufficientMemory";
pub const NODE_HAS_SUFFICIENT_PID: &str =
    r"reason/NodeHasSufficientPID.*status is now: NodeHasSufficientPID";

pub const OVN_READINESS: &str = r"ns/(?P<NS>openshift-ovn-kubernetes) pod/(?P<POD>ovnkube-node-[a-z0-9-]+) node/(?P<NODE>[a-z0-9.-]+) - reason/(?P<REASON>Unhealthy) (?P<MSG>Readiness probe failed:.*$)";
pub const CONSOLE_READINESS: &str = r"ns/(?P<NS>openshift-console) pod/(?P<POD>console-[a-z0-9-]+) node/(?P<NODE>[a-z0-9.-]+) - reason/(?P<REASON>ProbeError) (?P<MSG>Readiness probe error:.* connect: connection refused$)";
pub const MARKETPLACE_STARTUP_PROBE_FAILURE: &str = r"ns/(?P<NS>openshift-marketplace) pod/(?P<POD>(community-operators|redhat-operators)-[a-z0-9-]+).*Startup probe failed";

/// Repeats that are expected on any cluster
pub const ALLOWED_REPEATED_EVENT_PATTERNS: &[&str] = &[
    // Statefulset tests pause new pods by failing their readiness probe.
    r"ns/e2e-statefulset-[0-9]+ pod/ss-[0-9] node/[a-z0-9.-]+ - reason/Unhealthy Readiness probe failed: ",
    r"ns/e2e-statefulset-[0-9]+ pod/ss2-[0-9] node/[a-z0-9.-]+ - reason/Unhealthy Readiness probe failed: HTTP probe failed with statuscode: 404",
    // Container probing tests fail probes on purpose.
    r"ns/e2e-container-probe-[0-9]+ .* probe failed: ",
    r"ns/e2e-container-probe-[0-9]+ .* probe warning: ",
    // Port forwarding tests reuse one pod name with a tight readiness check.
    r"ns/e2e-port-forwarding-[0-9]+ pod/pfpod node/[a-z0-9.-]+ - reason/Unhealthy Readiness probe failed:",
    // The init container fails on purpose.
    r"ns/e2e-init-container-[0-9]+ pod/pod-init-[a-z0-9.-]+ node/[a-z0-9.-]+ - reason/BackOff Back-off restarting failed container",
    // Pods shaped to never be scheduled.
    r"ns/e2e-test-scc-[a-z0-9]+ pod/.* - reason/FailedScheduling.*",
    // Containers that must never run.
    r#"ns/e2e-security-context-test-[0-9]+ pod/.*-root-uid node/[a-z0-9.-]+ - reason/Failed Error: container's runAsUser breaks non-root policy.*""#,
    // Volume node affinity conflicts with the node selector.
    r"ns/e2e-persistent-local-volumes-test-[0-9]+ pod/pod-[a-z0-9.-]+ reason/FailedScheduling",
    // Deployment config tests cancel rollouts.
    r"reason/DeploymentAwaitingCancellation Deployment of version [0-9]+ awaiting cancellation of older running deployments",
    // An image that can never be pulled.
    r#".*reason/BackOff Back-off pulling image "webserver:404""#,
    // Image pull failures in test namespaces fail the tests themselves.
    r"ns/e2e-.* reason/BackOff Back-off pulling image",
    // Side-loaded log collection.
    r"ns/openshift-e2e-loki pod/loki-promtail.*Readiness probe",
    r"ns/openshift-e2e-loki pod/loki-promtail.*reason/NetworkNotReady",
    // Guard probes fail while operands roll out during bootstrap.
    r"ns/openshift-kube-apiserver pod/kube-apiserver-guard.*ProbeError Readiness probe error",
    r"ns/openshift-kube-controller-manager pod/kube-controller-manager-guard.*ProbeError Readiness probe error",
    r"ns/openshift-kube-scheduler pod/kube-scheduler-guard.*ProbeError Readiness probe error",
    // The more specific ProbeError event is reported instead.
    r"Unhealthy Readiness probe failed",
    r"TerminatingPodProbeError",
    // Covered by dedicated checks.
    OVN_READINESS,
    IMAGE_PULL_REDHAT,
    REQUIRED_RESOURCES_MISSING,
    BACKOFF_RESTARTING_FAILED,
    ERROR_UPDATING_ENDPOINT_SLICES,
    // Install succeeded despite the retries that produced this.
    r"reason/FailedCreate .* error creating EC2 instance: InsufficientInstanceCapacity: We currently do not have sufficient .* capacity in the Availability Zone you requested",
    NODE_HAS_NO_DISK_PRESSURE,
    NODE_HAS_SUFFICIENT_MEMORY,
    NODE_HAS_SUFFICIENT_PID,
    MARKETPLACE_STARTUP_PROBE_FAILURE,
];

/// Repeats that are expected only while the cluster is upgrading
pub const ALLOWED_UPGRADE_REPEATED_EVENT_PATTERNS: &[&str] = &[
    r"ns/openshift-etcd-operator deployment/etcd-operator - reason/MultipleVersions multiple versions found, probably in transition: .*",
    r"ns/openshift-kube-apiserver-operator deployment/kube-apiserver-operator - reason/MultipleVersions multiple versions found, probably in transition: .*",
    r"ns/openshift-kube-controller-manager-operator deployment/kube-controller-manager-operator - reason/MultipleVersions multiple versions found, probably in transition: .*",
    r"ns/openshift-kube-scheduler-operator deployment/openshift-kube-scheduler-operator - reason/MultipleVersions multiple versions found, probably in transition: .*",
    r"ns/openshift-etcd pod/etcd-quorum-guard-[a-z0-9-]+ node/[a-z0-9.-]+ - reason/Unhealthy Readiness probe failed: ",
    r"ns/openshift-etcd-operator deployment/etcd-operator - reason/UnhealthyEtcdMember unhealthy members: .*",
    r"ns/openshift-etcd-operator deployment/etcd-operator - reason/RequiredInstallerResourcesMissing configmaps: etcd-endpoints-[0-9]+",
    REQUIRED_RESOURCES_MISSING,
    MARKETPLACE_STARTUP_PROBE_FAILURE,
];

/// Compile a pattern from one of the static tables.
///
/// Panics with the offending pattern; the tables are fixed at build time.
pub(crate) fn static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid static pattern {pattern:?}: {err}"))
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| static_regex(p)).collect()
}

pub(crate) static BASE_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile_all(ALLOWED_REPEATED_EVENT_PATTERNS));
pub(crate) static UPGRADE_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile_all(ALLOWED_UPGRADE_REPEATED_EVENT_PATTERNS));

// =============================================================================
// Count helpers
// =============================================================================

static COUNT_EXTRACTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)(.*) \((\d+) times\).*").unwrap());
static TIMES_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+\(\d+ times\)").unwrap());

/// Split `"<text> (<N> times)"` into `(text, N)`.
///
/// Text without a count suffix, or with a count that does not fit, yields
/// `("", 0)`.
#[must_use]
pub fn extract_count(text: &str) -> (&str, u32) {
    let Some(caps) = COUNT_EXTRACTOR.captures(text) else {
        return ("", 0);
    };
    let (Some(prefix), Some(count)) = (caps.get(1), caps.get(2)) else {
        return ("", 0);
    };
    match count.as_str().parse::<u32>() {
        Ok(times) => (prefix.as_str(), times),
        Err(_) => ("", 0),
    }
}

/// Whether the text has the `(<N> times)` repeat shape
#[must_use]
pub fn has_repeat_shape(text: &str) -> bool {
    COUNT_EXTRACTOR.is_match(text)
}

/// Remove every ` (<N> times)` suffix.
#[must_use]
pub fn strip_counts(text: &str) -> Cow<'_, str> {
    TIMES_SUFFIX.replace_all(text, "")
}

/// Short content hash of a message with its counts removed
#[must_use]
pub fn message_hash(message: &str) -> String {
    let digest = Sha256::digest(strip_counts(message).as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(HASH_DIGITS);
    hash
}

/// `<locator> hmsg/<hash of labeled_message>`
#[must_use]
pub fn hashed_locator(locator: &str, labeled_message: &str) -> String {
    format!("{locator} hmsg/{}", message_hash(labeled_message))
}

/// Prefix `label` to a message.
#[must_use]
pub fn labeled(label: &str, message: &str) -> String {
    format!("{label} {message}")
}

/// Message with a leading repeat label removed
#[must_use]
pub fn unlabeled(message: &str) -> &str {
    message
        .strip_prefix(KNOWN_LABEL)
        .or_else(|| message.strip_prefix(NEW_LABEL))
        .map_or(message, str::trim_start)
}

/// Whether a message carries the pathological mark
#[must_use]
pub fn is_pathological(message: &str) -> bool {
    message.contains(PATHOLOGICAL_MARK)
}

/// Whether a message carries the interesting mark
#[must_use]
pub fn is_interesting(message: &str) -> bool {
    message.contains(INTERESTING_MARK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "invalid static pattern \"reason/(Unclosed\"")]
    fn bad_static_pattern_names_itself() {
        let _ = static_regex("reason/(Unclosed");
    }

    #[test]
    fn static_patterns_compile() {
        assert_eq!(BASE_PATTERNS.len(), ALLOWED_REPEATED_EVENT_PATTERNS.len());
        assert_eq!(
            UPGRADE_PATTERNS.len(),
            ALLOWED_UPGRADE_REPEATED_EVENT_PATTERNS.len()
        );
    }

    #[test]
    fn extract_count_cases() {
        assert_eq!(extract_count("X (12 times)"), ("X", 12));
        assert_eq!(extract_count("X"), ("", 0));
        assert_eq!(
            extract_count("ns/a - reason/BackOff Back-off (5 times) trailing"),
            ("ns/a - reason/BackOff Back-off", 5)
        );
        assert_eq!(extract_count("X (99999999999 times)"), ("", 0));
        assert_eq!(extract_count("multi\nline (3 times)"), ("multi\nline", 3));
    }

    #[test]
    fn strip_and_hash() {
        assert_eq!(strip_counts("reason/X boom (21 times)"), "reason/X boom");
        assert_eq!(message_hash("reason/X boom (21 times)"), message_hash("reason/X boom (3 times)"));
        assert_ne!(message_hash("reason/X boom"), message_hash("reason/Y boom"));
        assert_eq!(message_hash("anything").len(), 10);
        let locator = hashed_locator("ns/a pod/b", "pathological/true reason/X boom (21 times)");
        assert!(locator.starts_with("ns/a pod/b hmsg/"));
    }

    #[test]
    fn labels() {
        assert_eq!(labeled(NEW_LABEL, "reason/X"), "pathological/true reason/X");
        assert_eq!(unlabeled("pathological/true interesting/true reason/X"), "reason/X");
        assert_eq!(unlabeled("pathological/true reason/X"), "reason/X");
        assert_eq!(unlabeled("reason/X"), "reason/X");
        assert!(is_pathological("pathological/true reason/X"));
        assert!(!is_interesting("pathological/true reason/X"));
        assert!(is_interesting(KNOWN_LABEL));
    }
}
