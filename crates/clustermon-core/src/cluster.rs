//! Cluster metadata boundary
//!
//! The classifier and the event task need a handful of facts about the
//! cluster under test. [`ClusterClient`] is the seam to the API server;
//! [`ClusterInfo`] is the snapshot of those facts taken once per
//! evaluation. Every lookup degrades instead of failing: a missing object
//! becomes a zero value, any other error is logged and treated the same.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::config::ClassifierSettings;
use crate::error::ClusterError;
use crate::resources::{Event, Node};

/// Control-plane topology reported by the infrastructure object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Topology {
    /// Not reported
    #[default]
    #[serde(rename = "")]
    Unset,
    HighlyAvailable,
    SingleReplica,
    External,
}

/// Platform and topology of the cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Infrastructure {
    /// Platform type, e.g. `AWS`, `GCP`, `None`
    pub platform: String,
    pub control_plane_topology: Topology,
}

/// Read-only access to the cluster API.
///
/// Methods return `Send` futures so callers can drive them from spawned
/// tasks; implementations may use `async fn`.
pub trait ClusterClient: Send + Sync {
    fn infrastructure(&self)
    -> impl Future<Output = Result<Infrastructure, ClusterError>> + Send;

    fn node(&self, name: &str) -> impl Future<Output = Result<Node, ClusterError>> + Send;

    /// Current revision of every etcd member
    fn etcd_node_revisions(&self) -> impl Future<Output = Result<Vec<i64>, ClusterError>> + Send;

    /// Completion time of the newest cluster version history entry;
    /// `None` while the install is still running.
    fn install_completion_time(
        &self,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, ClusterError>> + Send;

    fn list_events(
        &self,
        namespace: &str,
    ) -> impl Future<Output = Result<Vec<Event>, ClusterError>> + Send;
}

// =============================================================================
// In-memory cluster
// =============================================================================

/// In-memory [`ClusterClient`] for offline evaluation and tests
#[derive(Debug, Default)]
pub struct StaticCluster {
    pub infrastructure: Option<Infrastructure>,
    pub nodes: BTreeMap<String, Node>,
    /// `None` when no etcd operator exists on the cluster
    pub etcd_revisions: Option<Vec<i64>>,
    pub install_completion: Option<DateTime<Utc>>,
    pub events: BTreeMap<String, Vec<Event>>,
    /// When set, every call fails with [`ClusterError::Unavailable`]
    pub unavailable: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl StaticCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_infrastructure(mut self, platform: &str, topology: Topology) -> Self {
        self.infrastructure = Some(Infrastructure {
            platform: platform.to_string(),
            control_plane_topology: topology,
        });
        self
    }

    #[must_use]
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.insert(node.metadata.name.clone(), node);
        self
    }

    #[must_use]
    pub fn with_etcd_revisions(mut self, revisions: Vec<i64>) -> Self {
        self.etcd_revisions = Some(revisions);
        self
    }

    #[must_use]
    pub fn with_install_completion(mut self, at: DateTime<Utc>) -> Self {
        self.install_completion = Some(at);
        self
    }

    #[must_use]
    pub fn with_events(mut self, namespace: &str, events: Vec<Event>) -> Self {
        self.events.insert(namespace.to_string(), events);
        self
    }

    #[must_use]
    pub fn unavailable(mut self, reason: &str) -> Self {
        self.unavailable = Some(reason.to_string());
        self
    }

    /// Names of the calls served so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn serve(&self, call: &str) -> Result<(), ClusterError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.to_string());
        match &self.unavailable {
            Some(reason) => Err(ClusterError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

impl ClusterClient for StaticCluster {
    async fn infrastructure(&self) -> Result<Infrastructure, ClusterError> {
        self.serve("infrastructure")?;
        self.infrastructure.clone().ok_or(ClusterError::NotFound {
            kind: "infrastructure".to_string(),
            name: "cluster".to_string(),
        })
    }

    async fn node(&self, name: &str) -> Result<Node, ClusterError> {
        self.serve("node")?;
        self.nodes
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: "node".to_string(),
                name: name.to_string(),
            })
    }

    async fn etcd_node_revisions(&self) -> Result<Vec<i64>, ClusterError> {
        self.serve("etcd")?;
        self.etcd_revisions.clone().ok_or(ClusterError::NotFound {
            kind: "etcd".to_string(),
            name: "cluster".to_string(),
        })
    }

    async fn install_completion_time(&self) -> Result<Option<DateTime<Utc>>, ClusterError> {
        self.serve("clusterversion")?;
        Ok(self.install_completion)
    }

    async fn list_events(&self, namespace: &str) -> Result<Vec<Event>, ClusterError> {
        self.serve("events")?;
        Ok(self.events.get(namespace).cloned().unwrap_or_default())
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Namespaces whose live events the allowance predicates consult
pub const PREDICATE_EVENT_NAMESPACES: &[&str] = &["openshift-console"];

/// Facts about the cluster under test, gathered once per evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterInfo {
    /// False when no cluster client was supplied
    pub connected: bool,
    pub platform: String,
    pub topology: Topology,
    /// Highest current revision among etcd members, 0 when unknown
    pub etcd_max_revision: i64,
    pub install_completion: Option<DateTime<Utc>>,
    /// Live events per namespace; a namespace whose listing failed is absent
    pub events: BTreeMap<String, Vec<Event>>,
}

impl ClusterInfo {
    /// Snapshot without a cluster: platform and topology from settings.
    #[must_use]
    pub fn offline(settings: &ClassifierSettings) -> Self {
        Self {
            connected: false,
            platform: settings.platform.clone().unwrap_or_default(),
            topology: settings.topology.unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Gather cluster facts; every failed lookup degrades to its zero value.
    pub async fn fetch<C: ClusterClient>(client: Option<&C>, settings: &ClassifierSettings) -> Self {
        let mut info = Self::offline(settings);
        let Some(client) = client else {
            debug!("no cluster client; using offline cluster info");
            return info;
        };
        info.connected = true;

        match client.infrastructure().await {
            Ok(infra) => {
                if !infra.platform.is_empty() {
                    info.platform = infra.platform;
                }
                if infra.control_plane_topology != Topology::Unset {
                    info.topology = infra.control_plane_topology;
                }
            }
            Err(err) => log_lookup_failure("infrastructure", &err),
        }

        match client.etcd_node_revisions().await {
            Ok(revisions) => info.etcd_max_revision = revisions.into_iter().max().unwrap_or(0).max(0),
            Err(err) => log_lookup_failure("etcd revisions", &err),
        }

        match client.install_completion_time().await {
            Ok(at) => info.install_completion = at,
            Err(err) => log_lookup_failure("install completion time", &err),
        }

        for namespace in PREDICATE_EVENT_NAMESPACES {
            match client.list_events(namespace).await {
                Ok(events) => {
                    info.events.insert((*namespace).to_string(), events);
                }
                Err(err) => log_lookup_failure(namespace, &err),
            }
        }

        debug!(
            platform = %info.platform,
            topology = ?info.topology,
            etcd_revision = info.etcd_max_revision,
            "cluster info gathered"
        );
        info
    }

    /// Live events of a namespace, when the listing succeeded
    #[must_use]
    pub fn events_in(&self, namespace: &str) -> Option<&[Event]> {
        self.events.get(namespace).map(Vec::as_slice)
    }
}

/// Missing objects are expected on some clusters; anything else is worth a
/// warning. Either way the caller falls back to a zero value.
fn log_lookup_failure(what: &str, err: &ClusterError) {
    if err.is_not_found() {
        debug!(lookup = what, error = %err, "cluster lookup found nothing; using default");
    } else {
        warn!(
            lookup = what,
            error = %err,
            transient = err.is_transient(),
            hint = err.hint(),
            "cluster lookup failed; using default"
        );
    }
}

/// Roles of a node; `None` when the node cannot be read
pub async fn node_roles<C: ClusterClient>(client: &C, name: &str) -> Option<String> {
    match client.node(name).await {
        Ok(node) => Some(node.roles()),
        Err(err) => {
            debug!(node = name, error = %err, "could not read node roles");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings() -> ClassifierSettings {
        ClassifierSettings {
            platform: Some("None".to_string()),
            topology: Some(Topology::SingleReplica),
            ..ClassifierSettings::default()
        }
    }

    #[test]
    fn topology_wire_names() {
        let t: Topology = serde_json::from_str("\"SingleReplica\"").unwrap();
        assert_eq!(t, Topology::SingleReplica);
        let t: Topology = serde_json::from_str("\"\"").unwrap();
        assert_eq!(t, Topology::Unset);
    }

    #[tokio::test]
    async fn fetch_without_client_uses_settings() {
        let info = ClusterInfo::fetch::<StaticCluster>(None, &settings()).await;
        assert!(!info.connected);
        assert_eq!(info.platform, "None");
        assert_eq!(info.topology, Topology::SingleReplica);
        assert_eq!(info.etcd_max_revision, 0);
    }

    #[tokio::test]
    async fn fetch_reads_every_fact() {
        let done = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let cluster = StaticCluster::new()
            .with_infrastructure("AWS", Topology::HighlyAvailable)
            .with_etcd_revisions(vec![4, 9, 7])
            .with_install_completion(done)
            .with_events("openshift-console", vec![Event::default()]);

        let info = ClusterInfo::fetch(Some(&cluster), &settings()).await;
        assert!(info.connected);
        assert_eq!(info.platform, "AWS");
        assert_eq!(info.topology, Topology::HighlyAvailable);
        assert_eq!(info.etcd_max_revision, 9);
        assert_eq!(info.install_completion, Some(done));
        assert_eq!(info.events_in("openshift-console").map(<[Event]>::len), Some(1));
    }

    #[tokio::test]
    async fn missing_etcd_is_revision_zero() {
        let cluster = StaticCluster::new().with_infrastructure("AWS", Topology::HighlyAvailable);
        let info = ClusterInfo::fetch(Some(&cluster), &ClassifierSettings::default()).await;
        assert_eq!(info.etcd_max_revision, 0);
    }

    #[tokio::test]
    async fn unavailable_cluster_degrades() {
        let cluster = StaticCluster::new()
            .with_etcd_revisions(vec![3])
            .unavailable("connection refused");
        let info = ClusterInfo::fetch(Some(&cluster), &settings()).await;
        assert!(info.connected);
        assert_eq!(info.etcd_max_revision, 0);
        assert_eq!(info.topology, Topology::SingleReplica);
        assert!(info.events_in("openshift-console").is_none());
        assert_eq!(cluster.calls().len(), 4);
    }

    #[tokio::test]
    async fn node_roles_degrade_to_none() {
        let mut node = Node::default();
        node.metadata.name = "master-0".to_string();
        node.metadata
            .labels
            .insert("node-role.kubernetes.io/master".to_string(), String::new());
        let cluster = StaticCluster::new().with_node(node);
        assert_eq!(node_roles(&cluster, "master-0").await.as_deref(), Some("master"));
        assert_eq!(node_roles(&cluster, "worker-9").await, None);
    }
}
