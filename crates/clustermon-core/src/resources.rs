//! Resource snapshots consumed by the monitor
//!
//! These are hand-written serde models of the subset of the orchestration
//! API the detectors read. Field names follow the API's camelCase wire
//! format so list/watch payloads deserialize directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation set on mirror (static) pods by the node agent
pub const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";

/// Label prefix carrying a node's roles
pub const NODE_ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";

/// Standard object metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub resource_version: String,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub deletion_timestamp: Option<DateTime<Utc>>,
    pub deletion_grace_period_seconds: Option<i64>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// `namespace/name`, or just `name` for cluster-scoped objects
    #[must_use]
    pub fn key(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }
}

// =============================================================================
// Pods
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PodPhase {
    /// Phase not reported yet
    #[default]
    #[serde(rename = "")]
    Unset,
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodSpec {
    pub node_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodStatus {
    pub phase: PodPhase,
    pub reason: String,
    pub message: String,
    pub container_statuses: Vec<ContainerStatus>,
    pub init_container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerStatus {
    pub name: String,
    pub ready: bool,
    pub restart_count: i32,
    pub state: ContainerState,
    #[serde(rename = "lastState")]
    pub last_termination_state: ContainerState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerState {
    pub waiting: Option<ContainerStateWaiting>,
    pub running: Option<ContainerStateRunning>,
    pub terminated: Option<ContainerStateTerminated>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerStateWaiting {
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerStateRunning {
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerStateTerminated {
    pub exit_code: i32,
    pub reason: String,
    pub message: String,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pod {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
    pub status: PodStatus,
}

impl Pod {
    /// Static pods managed directly by a node agent
    #[must_use]
    pub fn is_mirror_pod(&self) -> bool {
        self.metadata
            .annotations
            .get(MIRROR_POD_ANNOTATION)
            .is_some_and(|v| !v.is_empty())
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        !self.spec.node_name.is_empty()
    }
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectReference {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub field_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventSource {
    pub component: String,
    pub host: String,
}

/// Event type reported by the emitter
pub const EVENT_TYPE_WARNING: &str = "Warning";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    pub metadata: ObjectMeta,
    pub involved_object: ObjectReference,
    pub related: Option<ObjectReference>,
    pub reason: String,
    pub message: String,
    pub source: EventSource,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub event_time: Option<DateTime<Utc>>,
    pub count: i32,
    #[serde(rename = "type")]
    pub event_type: String,
}

impl Event {
    /// Newest timestamp: last seen, then event time, then creation.
    #[must_use]
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
            .or(self.event_time)
            .or(self.metadata.creation_timestamp)
    }

    /// Oldest timestamp: first seen, then event time, then creation.
    #[must_use]
    pub fn first_observed_at(&self) -> Option<DateTime<Utc>> {
        self.first_timestamp
            .or(self.event_time)
            .or(self.metadata.creation_timestamp)
    }

    #[must_use]
    pub fn is_warning(&self) -> bool {
        self.event_type == EVENT_TYPE_WARNING
    }
}

// =============================================================================
// Nodes
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Node {
    pub metadata: ObjectMeta,
}

impl Node {
    /// Sorted, comma-joined roles from `node-role.kubernetes.io/<role>` labels
    #[must_use]
    pub fn roles(&self) -> String {
        let mut roles: Vec<&str> = self
            .metadata
            .labels
            .keys()
            .filter_map(|k| k.strip_prefix(NODE_ROLE_LABEL_PREFIX))
            .filter(|r| !r.is_empty())
            .collect();
        roles.sort_unstable();
        roles.join(",")
    }
}

// =============================================================================
// Watched resources
// =============================================================================

/// Closed set of resource kinds the monitor watches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "object")]
pub enum WatchedResource {
    Event(Box<Event>),
    Pod(Box<Pod>),
}

impl WatchedResource {
    /// Resource-kind name used as the outer key of [`ResourcesMap`]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Event(_) => "events",
            Self::Pod(_) => "pods",
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Event(event) => &event.metadata,
            Self::Pod(pod) => &pod.metadata,
        }
    }

    #[must_use]
    pub fn key(&self) -> String {
        self.metadata().key()
    }
}

impl From<Event> for WatchedResource {
    fn from(event: Event) -> Self {
        Self::Event(Box::new(event))
    }
}

impl From<Pod> for WatchedResource {
    fn from(pod: Pod) -> Self {
        Self::Pod(Box::new(pod))
    }
}

/// kind → resource key → last known snapshot
pub type ResourcesMap = BTreeMap<String, BTreeMap<String, WatchedResource>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_deserializes_from_api_json() {
        let pod: Pod = serde_json::from_str(
            r#"{
              "metadata": {"name": "web-1", "namespace": "app", "uid": "u1",
                           "resourceVersion": "42",
                           "annotations": {"kubernetes.io/config.mirror": "abc"}},
              "spec": {"nodeName": "worker-0"},
              "status": {
                "phase": "Running",
                "containerStatuses": [{
                  "name": "web", "ready": true, "restartCount": 2,
                  "state": {"running": {"startedAt": "2024-05-01T10:00:00Z"}},
                  "lastState": {"terminated": {"exitCode": 137, "reason": "OOMKilled"}}
                }]
              }
            }"#,
        )
        .unwrap();
        assert_eq!(pod.metadata.key(), "app/web-1");
        assert_eq!(pod.status.phase, PodPhase::Running);
        assert!(pod.is_mirror_pod());
        assert!(pod.is_scheduled());
        let status = &pod.status.container_statuses[0];
        assert_eq!(status.restart_count, 2);
        assert!(status.state.running.is_some());
        let last = status.last_termination_state.terminated.as_ref().unwrap();
        assert_eq!(last.exit_code, 137);
    }

    #[test]
    fn empty_phase_is_unset() {
        let pod: Pod = serde_json::from_str(r#"{"status": {"phase": ""}}"#).unwrap();
        assert_eq!(pod.status.phase, PodPhase::Unset);
        let pod: Pod = serde_json::from_str("{}").unwrap();
        assert_eq!(pod.status.phase, PodPhase::Unset);
    }

    #[test]
    fn event_timestamp_preference() {
        let mut event: Event = serde_json::from_str(
            r#"{"metadata": {"creationTimestamp": "2024-05-01T10:00:00Z"},
                "eventTime": "2024-05-01T10:05:00Z",
                "type": "Warning", "count": 3}"#,
        )
        .unwrap();
        assert!(event.is_warning());
        assert_eq!(event.observed_at().unwrap().to_rfc3339(), "2024-05-01T10:05:00+00:00");
        event.last_timestamp = event.metadata.creation_timestamp;
        assert_eq!(event.observed_at(), event.metadata.creation_timestamp);
        assert_eq!(event.first_observed_at(), event.event_time);
    }

    #[test]
    fn node_roles_are_sorted_and_joined() {
        let mut node = Node::default();
        for label in [
            "node-role.kubernetes.io/worker",
            "node-role.kubernetes.io/master",
            "kubernetes.io/hostname",
        ] {
            node.metadata.labels.insert(label.to_string(), String::new());
        }
        assert_eq!(node.roles(), "master,worker");
    }

    #[test]
    fn watched_resource_kind_and_key() {
        let mut pod = Pod::default();
        pod.metadata.name = "p".to_string();
        pod.metadata.namespace = "ns".to_string();
        let resource = WatchedResource::from(pod);
        assert_eq!(resource.kind(), "pods");
        assert_eq!(resource.key(), "ns/p");
        assert_eq!(WatchedResource::from(Event::default()).kind(), "events");
    }
}
