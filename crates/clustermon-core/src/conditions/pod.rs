//! Pod transition detectors
//!
//! Each detector maps a `(new, old)` pod snapshot pair to zero or more
//! conditions. Detectors are stateless and run in the fixed order of
//! [`PodDetector::ALL`]; their output concatenates in that order.
//!
//! On create there is no old snapshot and every detector compares against
//! an absent baseline: no node, no container statuses, no phase, no
//! deletion grace period.

use chrono::{DateTime, Utc};

use crate::interval::{Condition, reason, reasoned_message};
use crate::locator::{locate_pod, locate_pod_container};
use crate::resources::{ContainerStatus, ContainerStateTerminated, Pod, PodPhase};

/// Named update detectors, in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodDetector {
    /// Node assignment from empty to set
    Scheduling,
    /// Waiting / running / terminated / restart transitions per container
    ContainerLifecycle,
    /// Ready flag transitions per container
    Readiness,
    /// Pending regressions, Unknown, Failed
    PhaseTransition,
    /// Deletion grace period set or cleared
    Deletion,
    /// Container status lists must never shrink
    StatusRemoval,
    /// Node assignment must never change once set
    NodeReassignment,
}

impl PodDetector {
    pub const ALL: [Self; 7] = [
        Self::Scheduling,
        Self::ContainerLifecycle,
        Self::Readiness,
        Self::PhaseTransition,
        Self::Deletion,
        Self::StatusRemoval,
        Self::NodeReassignment,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Scheduling => "scheduling",
            Self::ContainerLifecycle => "container-lifecycle",
            Self::Readiness => "readiness",
            Self::PhaseTransition => "phase-transition",
            Self::Deletion => "deletion",
            Self::StatusRemoval => "status-removal",
            Self::NodeReassignment => "node-reassignment",
        }
    }

    /// Conditions for the transition `old → pod` (`old` is `None` on create)
    #[must_use]
    pub fn detect(self, pod: &Pod, old: Option<&Pod>) -> Vec<Condition> {
        match self {
            Self::Scheduling => scheduled(pod, old),
            Self::ContainerLifecycle => container_lifecycle(pod, old),
            Self::Readiness => readiness(pod, old),
            Self::PhaseTransition => phase_transition(pod, old),
            Self::Deletion => deletion(pod, old),
            Self::StatusRemoval => status_removal(pod, old),
            Self::NodeReassignment => node_reassignment(pod, old),
        }
    }
}

/// Conditions for a pod observed for the first time
#[must_use]
pub fn conditions_for_create(pod: &Pod) -> Vec<Condition> {
    let mut conditions = vec![Condition::info(
        locate_pod(pod),
        reasoned_message(reason::CREATED, ""),
    )];
    for detector in PodDetector::ALL {
        conditions.extend(detector.detect(pod, None));
    }
    conditions
}

/// Conditions for an update from `old` to `pod`
#[must_use]
pub fn conditions_for_update(pod: &Pod, old: &Pod) -> Vec<Condition> {
    PodDetector::ALL
        .into_iter()
        .flat_map(|detector| detector.detect(pod, Some(old)))
        .collect()
}

/// Conditions for the final snapshot of a deleted pod
#[must_use]
pub fn conditions_for_delete(pod: &Pod) -> Vec<Condition> {
    let locator = locate_pod(pod);
    let mut conditions = vec![Condition::info(
        locator.clone(),
        reasoned_message(reason::DELETED, ""),
    )];
    if !pod.is_scheduled() {
        conditions.push(Condition::info(
            locator,
            reasoned_message(reason::DELETED_BEFORE_SCHEDULING, ""),
        ));
    } else if pod.status.phase.is_terminal() {
        conditions.push(Condition::info(
            locator,
            reasoned_message(reason::DELETED_AFTER_COMPLETION, ""),
        ));
    }
    conditions
}

/// Sampler body: pods stuck in Pending longer than `threshold`
pub fn pending_too_long<'a>(
    pods: impl IntoIterator<Item = &'a Pod>,
    now: DateTime<Utc>,
    threshold: chrono::Duration,
) -> Vec<Condition> {
    let message = if threshold == chrono::Duration::minutes(1) {
        "pod has been pending longer than a minute".to_string()
    } else {
        format!(
            "pod has been pending longer than {}s",
            threshold.num_seconds()
        )
    };
    pods.into_iter()
        .filter(|pod| pod.status.phase == PodPhase::Pending)
        .filter(|pod| {
            pod.metadata
                .creation_timestamp
                .is_some_and(|created| now - created > threshold)
        })
        .map(|pod| Condition::warning(locate_pod(pod), message.clone()))
        .collect()
}

// =============================================================================
// Container status helpers
// =============================================================================

/// Match by index first, then by name.
fn find_container_status<'a>(
    statuses: &'a [ContainerStatus],
    name: &str,
    index: usize,
) -> Option<&'a ContainerStatus> {
    if let Some(status) = statuses.get(index) {
        if status.name == name {
            return Some(status);
        }
    }
    statuses.iter().find(|s| s.name == name)
}

fn transition_message(reason: &str, cause: &str, detail: &str) -> String {
    let mut text = format!("cause/{cause}:");
    if !detail.is_empty() {
        text.push(' ');
        text.push_str(detail);
    }
    reasoned_message(reason, &text)
}

fn exit_message(terminated: &ContainerStateTerminated) -> String {
    let mut text = format!(
        "code/{} cause/{}",
        terminated.exit_code, terminated.reason
    );
    if !terminated.message.is_empty() {
        text.push(' ');
        text.push_str(&terminated.message);
    }
    reasoned_message(reason::CONTAINER_EXIT, &text)
}

/// Both status lists of a pod, paired with the matching old lists.
fn status_pairs<'a>(
    pod: &'a Pod,
    old: Option<&'a Pod>,
) -> [(&'a [ContainerStatus], &'a [ContainerStatus]); 2] {
    let empty: &[ContainerStatus] = &[];
    [
        (
            pod.status.container_statuses.as_slice(),
            old.map_or(empty, |o| o.status.container_statuses.as_slice()),
        ),
        (
            pod.status.init_container_statuses.as_slice(),
            old.map_or(empty, |o| o.status.init_container_statuses.as_slice()),
        ),
    ]
}

// =============================================================================
// Detectors
// =============================================================================

fn scheduled(pod: &Pod, old: Option<&Pod>) -> Vec<Condition> {
    let old_has_node = old.is_some_and(Pod::is_scheduled);
    if !old_has_node && pod.is_scheduled() {
        return vec![Condition::info(
            locate_pod(pod),
            reasoned_message(
                reason::SCHEDULED,
                &format!("node/{}", pod.spec.node_name),
            ),
        )];
    }
    Vec::new()
}

fn container_lifecycle(pod: &Pod, old: Option<&Pod>) -> Vec<Condition> {
    let mut conditions = Vec::new();
    for (statuses, old_statuses) in status_pairs(pod, old) {
        conditions.extend(container_wait(pod, statuses, old_statuses));
        conditions.extend(container_start(pod, statuses, old_statuses));
        conditions.extend(container_exit(pod, statuses, old_statuses));
        conditions.extend(container_restarted(pod, statuses, old_statuses));
    }
    conditions
}

fn container_wait(
    pod: &Pod,
    statuses: &[ContainerStatus],
    old_statuses: &[ContainerStatus],
) -> Vec<Condition> {
    let mut conditions = Vec::new();
    for (i, status) in statuses.iter().enumerate() {
        let Some(waiting) = &status.state.waiting else {
            continue;
        };
        let old = find_container_status(old_statuses, &status.name, i);
        let entered = match old.map(|o| &o.state.waiting) {
            None | Some(None) => true,
            Some(Some(old_waiting)) => old_waiting.reason != waiting.reason,
        };
        if entered {
            conditions.push(Condition::info(
                locate_pod_container(pod, &status.name),
                transition_message(reason::CONTAINER_WAIT, &waiting.reason, &waiting.message),
            ));
        }
    }
    conditions
}

fn container_start(
    pod: &Pod,
    statuses: &[ContainerStatus],
    old_statuses: &[ContainerStatus],
) -> Vec<Condition> {
    statuses
        .iter()
        .enumerate()
        .filter(|(_, status)| status.state.running.is_some())
        .filter(|(i, status)| {
            find_container_status(old_statuses, &status.name, *i)
                .is_none_or(|old| old.state.running.is_none())
        })
        .map(|(_, status)| {
            Condition::info(
                locate_pod_container(pod, &status.name),
                reasoned_message(reason::CONTAINER_START, ""),
            )
        })
        .collect()
}

fn container_exit(
    pod: &Pod,
    statuses: &[ContainerStatus],
    old_statuses: &[ContainerStatus],
) -> Vec<Condition> {
    let mut conditions = Vec::new();
    for (i, status) in statuses.iter().enumerate() {
        let locator = locate_pod_container(pod, &status.name);
        let old = find_container_status(old_statuses, &status.name, i);

        if let Some(old) = old {
            if old.last_termination_state.terminated.is_some()
                && status.last_termination_state.terminated.is_none()
            {
                conditions.push(Condition::error(
                    locator.clone(),
                    reasoned_message(
                        reason::TERMINATION_STATE_CLEARED,
                        "lastState.terminated was cleared on a pod (bug https://bugzilla.redhat.com/show_bug.cgi?id=1933760 or similar)",
                    ),
                ));
            }
        }

        // Without an old status this is an initial list that missed the
        // start; an exit here would be disconnected from its lifecycle.
        let Some(old) = old else {
            continue;
        };

        let terminated = match (
            &status.last_termination_state.terminated,
            &status.state.terminated,
        ) {
            (Some(last), _) if old.last_termination_state.terminated.is_none() => Some(last),
            (_, Some(current)) if old.state.terminated.is_none() => Some(current),
            _ => None,
        };
        if let Some(terminated) = terminated {
            let message = exit_message(terminated);
            conditions.push(if terminated.exit_code != 0 {
                Condition::error(locator, message)
            } else {
                Condition::info(locator, message)
            });
        }
    }
    conditions
}

fn container_restarted(
    pod: &Pod,
    statuses: &[ContainerStatus],
    old_statuses: &[ContainerStatus],
) -> Vec<Condition> {
    statuses
        .iter()
        .enumerate()
        .filter(|(_, status)| status.restart_count != 0)
        .filter(|(i, status)| {
            find_container_status(old_statuses, &status.name, *i)
                .is_some_and(|old| old.restart_count != status.restart_count)
        })
        .map(|(_, status)| {
            Condition::warning(
                locate_pod_container(pod, &status.name),
                reasoned_message(reason::RESTARTED, ""),
            )
        })
        .collect()
}

fn readiness(pod: &Pod, old: Option<&Pod>) -> Vec<Condition> {
    let mut conditions = Vec::new();
    for (statuses, old_statuses) in status_pairs(pod, old) {
        // An empty old list means the statuses are new: report every state.
        let is_create = old_statuses.is_empty();
        for (i, status) in statuses.iter().enumerate() {
            let old_ready = find_container_status(old_statuses, &status.name, i)
                .is_some_and(|o| o.ready);
            let locator = locate_pod_container(pod, &status.name);
            if (is_create && !status.ready) || (old_ready && !status.ready) {
                conditions.push(Condition::warning(
                    locator.clone(),
                    reasoned_message(reason::NOT_READY, ""),
                ));
            }
            if (is_create && status.ready) || (!old_ready && status.ready) {
                conditions.push(Condition::info(
                    locator,
                    reasoned_message(reason::READY, ""),
                ));
            }
        }
    }
    conditions
}

fn phase_transition(pod: &Pod, old: Option<&Pod>) -> Vec<Condition> {
    let new_phase = pod.status.phase;
    let old_phase = old.map_or(PodPhase::Unset, |o| o.status.phase);
    if new_phase == old_phase || old_phase == PodPhase::Unset {
        return Vec::new();
    }

    let locator = locate_pod(pod);
    let mut conditions = Vec::new();
    match new_phase {
        PodPhase::Pending if old_phase != PodPhase::Unknown => {
            let message = if pod.metadata.deletion_timestamp.is_some() {
                format!(
                    "invariant violation (bug): pod should not transition {}->{} even when terminated",
                    old_phase.as_str(),
                    new_phase.as_str()
                )
            } else if pod.is_mirror_pod() {
                format!(
                    "invariant violation (bug): static pod should not transition {}->{} with same UID",
                    old_phase.as_str(),
                    new_phase.as_str()
                )
            } else {
                "pod moved back to Pending".to_string()
            };
            conditions.push(Condition::warning(locator, message));
        }
        PodPhase::Unknown => {
            conditions.push(Condition::warning(locator, "pod moved to the Unknown phase"));
        }
        PodPhase::Failed => {
            let status = &pod.status;
            let message = match status.reason.as_str() {
                "Evicted" => reasoned_message(reason::EVICTED, &status.message),
                "Preempting" => reasoned_message(reason::PREEMPTED, &status.message),
                other => reasoned_message(
                    reason::FAILED,
                    &format!("({other}): {}", status.message),
                ),
            };
            conditions.push(Condition::error(locator, message));

            let failed_containers = status
                .init_container_statuses
                .iter()
                .map(|s| ("init container", s))
                .chain(status.container_statuses.iter().map(|s| ("container", s)));
            for (label, s) in failed_containers {
                if let Some(t) = s.state.terminated.as_ref().filter(|t| t.exit_code != 0) {
                    conditions.push(Condition::error(
                        locate_pod_container(pod, &s.name),
                        format!(
                            "{label} exited with code {} ({}): {}",
                            t.exit_code, t.reason, t.message
                        ),
                    ));
                }
            }
        }
        _ => {}
    }
    conditions
}

fn deletion(pod: &Pod, old: Option<&Pod>) -> Vec<Condition> {
    let new_grace = pod.metadata.deletion_grace_period_seconds;
    let old_grace = old.and_then(|o| o.metadata.deletion_grace_period_seconds);
    let mut conditions = Vec::new();

    if let (Some(grace), None) = (new_grace, old_grace) {
        // Unscheduled and terminal pods are removed immediately, without a
        // graceful deletion phase.
        if pod.is_scheduled() && !pod.status.phase.is_terminal() {
            let message = if grace == 0 {
                reasoned_message(
                    reason::FORCE_DELETE,
                    &format!("mirrored/{}", pod.is_mirror_pod()),
                )
            } else {
                reasoned_message(reason::GRACEFUL_DELETE, &format!("duration/{grace}s"))
            };
            conditions.push(Condition::info(locate_pod(pod), message));
        }
    }
    if new_grace.is_none() && old_grace.is_some() {
        conditions.push(Condition::error(
            locate_pod(pod),
            "invariant violation: pod was marked for deletion and then deletion grace period was cleared",
        ));
    }
    conditions
}

fn status_removal(pod: &Pod, old: Option<&Pod>) -> Vec<Condition> {
    let Some(old) = old else {
        return Vec::new();
    };
    let mut conditions = Vec::new();
    if pod.status.container_statuses.len() < old.status.container_statuses.len() {
        conditions.push(Condition::error(
            locate_pod(pod),
            "invariant violation: container statuses were removed",
        ));
    }
    if pod.status.init_container_statuses.len() < old.status.init_container_statuses.len() {
        conditions.push(Condition::error(
            locate_pod(pod),
            "invariant violation: init container statuses were removed",
        ));
    }
    conditions
}

fn node_reassignment(pod: &Pod, old: Option<&Pod>) -> Vec<Condition> {
    match old {
        Some(old) if old.is_scheduled() && pod.spec.node_name != old.spec.node_name => {
            vec![Condition::error(
                locate_pod(pod),
                format!(
                    "invariant violation, pod once assigned to a node must stay on it. The pod previously scheduled to {}, has just been assigned to a new node {}",
                    old.spec.node_name, pod.spec.node_name
                ),
            )]
        }
        _ => Vec::new(),
    }
}
