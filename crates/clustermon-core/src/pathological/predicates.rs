//! Allowance predicates
//!
//! Each predicate explains a repeated event that no static pattern can:
//! the decision depends on the repeat count or on live cluster state. They
//! run in registration order and the first `Ok(true)` wins.

use regex::Regex;
use std::sync::LazyLock;

use crate::cluster::ClusterInfo;
use crate::error::ClassifierError;
use crate::interval::Condition;
use crate::locator::locator_parts;
use crate::pathological::patterns::{CONSOLE_READINESS, strip_counts, unlabeled};

static READINESS_FAILED_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"reason/ReadinessFailed.*Get.*healthz.*net/http.*request canceled while waiting for connection.*Client\.Timeout exceeded").unwrap()
});
static PROBE_ERROR_READINESS_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"reason/ProbeError.*Readiness probe error.*Client\.Timeout exceeded while awaiting headers").unwrap()
});
static PROBE_ERROR_LIVENESS_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"reason/ProbeError.*Liveness probe error.*Client\.Timeout exceeded while awaiting headers").unwrap()
});
static PROBE_ERROR_CONNECTION_REFUSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"reason/ProbeError.*Readiness probe error.*connection refused").unwrap()
});
static SINGLE_NODE_CONNECTION_REFUSED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"reason/ProbeError.*connect: connection refused").unwrap());
static ETCD_GUARD_PROBE_FAILURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ns/openshift-etcd pod/etcd-guard-.* node/[a-z0-9.-]+ - reason/(Unhealthy|ProbeError) Readiness probe.*").unwrap()
});
static CONSOLE_READINESS_FIELDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(CONSOLE_READINESS).unwrap());

const CONFIG_OPERATOR: &str = "openshift-config-operator";
const OAUTH_APISERVER: &str = "openshift-oauth-apiserver";

/// 60s to start a replacement etcd pod over a 5s probe period
pub const ETCD_GUARD_FAILURES_PER_REVISION: i64 = 60 / 5;

/// Named allowance strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowancePredicate {
    /// Console readiness probe refusals that happened before the install finished
    ConsoleReadinessDuringInstall,
    ConfigOperatorReadinessFailed,
    ConfigOperatorProbeErrorReadiness,
    ConfigOperatorProbeErrorLiveness,
    OauthApiserverProbeErrorReadiness,
    OauthApiserverProbeErrorLiveness,
    OauthApiserverConnectionRefused,
    /// Etcd guard probe failures, tolerated per rolled-out revision
    EtcdGuardRevisionChange { max_revision: i64 },
    /// Connection refused probe errors under `threshold` on single-replica clusters
    SingleNodeConnectionRefused { threshold: u32 },
}

impl AllowancePredicate {
    /// Predicates registered for every run, in order
    pub const BASE: [Self; 7] = [
        Self::ConsoleReadinessDuringInstall,
        Self::ConfigOperatorReadinessFailed,
        Self::ConfigOperatorProbeErrorReadiness,
        Self::ConfigOperatorProbeErrorLiveness,
        Self::OauthApiserverProbeErrorReadiness,
        Self::OauthApiserverProbeErrorLiveness,
        Self::OauthApiserverConnectionRefused,
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConsoleReadinessDuringInstall => "console-readiness-during-install",
            Self::ConfigOperatorReadinessFailed => "config-operator-readiness-failed",
            Self::ConfigOperatorProbeErrorReadiness => "config-operator-probe-error-readiness",
            Self::ConfigOperatorProbeErrorLiveness => "config-operator-probe-error-liveness",
            Self::OauthApiserverProbeErrorReadiness => "oauth-apiserver-probe-error-readiness",
            Self::OauthApiserverProbeErrorLiveness => "oauth-apiserver-probe-error-liveness",
            Self::OauthApiserverConnectionRefused => "oauth-apiserver-connection-refused",
            Self::EtcdGuardRevisionChange { .. } => "etcd-guard-revision-change",
            Self::SingleNodeConnectionRefused { .. } => "single-node-connection-refused",
        }
    }

    /// Whether a repeat of `condition` seen `count` times is acceptable
    pub fn decide(
        &self,
        condition: &Condition,
        count: u32,
        cluster: &ClusterInfo,
    ) -> Result<bool, ClassifierError> {
        let decision = match self {
            Self::ConsoleReadinessDuringInstall => console_readiness_during_install(condition, cluster)
                .map_err(|reason| ClassifierError::Predicate {
                    predicate: self.name(),
                    reason,
                })?,
            Self::ConfigOperatorReadinessFailed => {
                operator_message_matches(condition, CONFIG_OPERATOR, &READINESS_FAILED_MESSAGE)
            }
            Self::ConfigOperatorProbeErrorReadiness => {
                operator_message_matches(condition, CONFIG_OPERATOR, &PROBE_ERROR_READINESS_MESSAGE)
            }
            Self::ConfigOperatorProbeErrorLiveness => {
                operator_message_matches(condition, CONFIG_OPERATOR, &PROBE_ERROR_LIVENESS_MESSAGE)
            }
            Self::OauthApiserverProbeErrorReadiness => {
                operator_message_matches(condition, OAUTH_APISERVER, &PROBE_ERROR_READINESS_MESSAGE)
            }
            Self::OauthApiserverProbeErrorLiveness => {
                operator_message_matches(condition, OAUTH_APISERVER, &PROBE_ERROR_LIVENESS_MESSAGE)
            }
            Self::OauthApiserverConnectionRefused => {
                operator_message_matches(condition, OAUTH_APISERVER, &PROBE_ERROR_CONNECTION_REFUSED)
            }
            Self::EtcdGuardRevisionChange { max_revision } => {
                ETCD_GUARD_PROBE_FAILURE.is_match(&condition.display_text())
                    && ETCD_GUARD_FAILURES_PER_REVISION.saturating_mul(*max_revision) > i64::from(count)
            }
            Self::SingleNodeConnectionRefused { threshold } => {
                SINGLE_NODE_CONNECTION_REFUSED.is_match(&condition.display_text())
                    && count < *threshold
            }
        };
        Ok(decision)
    }
}

/// The condition belongs to `operator` (namespace equal, pod prefixed, when
/// present) and its message matches `pattern`.
fn operator_message_matches(condition: &Condition, operator: &str, pattern: &Regex) -> bool {
    let parts = locator_parts(&condition.locator);
    if parts.get("ns").is_some_and(|ns| *ns != operator) {
        return false;
    }
    if parts.get("pod").is_some_and(|pod| !pod.starts_with(operator)) {
        return false;
    }
    pattern.is_match(&condition.message)
}

/// Fields captured by the console readiness pattern
struct ProbeFields<'a> {
    namespace: &'a str,
    pod: &'a str,
    reason: &'a str,
    message: &'a str,
}

fn probe_fields<'a>(pattern: &Regex, text: &'a str) -> Result<ProbeFields<'a>, String> {
    let caps = pattern
        .captures(text)
        .ok_or_else(|| "regex match error".to_string())?;
    let field = |name: &str| caps.name(name).map_or("", |m| m.as_str());
    let fields = ProbeFields {
        namespace: field("NS"),
        pod: field("POD"),
        reason: field("REASON"),
        message: field("MSG"),
    };
    if fields.namespace.is_empty()
        || fields.pod.is_empty()
        || field("NODE").is_empty()
        || fields.message.is_empty()
    {
        return Err(format!(
            "regex match expects non-empty elements, got namespace: {}, pod: {}, node: {}, msg: {}",
            fields.namespace,
            fields.pod,
            field("NODE"),
            fields.message
        ));
    }
    Ok(fields)
}

/// Console readiness refusals are fine if the probe failed before the
/// install completed. Permissive when the cluster cannot tell.
fn console_readiness_during_install(
    condition: &Condition,
    cluster: &ClusterInfo,
) -> Result<bool, String> {
    let text = format!(
        "{} - {}",
        condition.locator,
        strip_counts(unlabeled(&condition.message))
    );
    let shaped = text.contains("ns/openshift-console")
        && text.contains("pod/console-")
        && text.contains("Readiness probe")
        && text.contains("connect: connection refused");
    if !shaped {
        return Ok(false);
    }

    if !cluster.connected {
        return Ok(true);
    }
    let Some(install_completed) = cluster.install_completion else {
        return Ok(true);
    };

    let fields = probe_fields(&CONSOLE_READINESS_FIELDS, &text)?;
    let Some(events) = cluster.events_in(fields.namespace) else {
        return Ok(true);
    };
    let after_install = events.iter().any(|event| {
        event
            .related
            .as_ref()
            .is_some_and(|related| related.name == fields.pod)
            && event.reason == fields.reason
            && event.message.contains(fields.message)
            && event
                .first_timestamp
                .is_some_and(|first| first > install_completed)
    });
    Ok(!after_install)
}
