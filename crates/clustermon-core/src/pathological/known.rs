//! Known problems: repeats that are real bugs tracked elsewhere
//!
//! A violation matching a known problem is reported as a flake instead of
//! a failure, provided every scope the entry declares agrees with the run.

use regex::Regex;
use std::sync::LazyLock;

use crate::cluster::Topology;
use crate::pathological::patterns::static_regex;

/// A statically registered bug pattern with optional scoping
#[derive(Debug)]
pub struct KnownProblem {
    pub pattern: Regex,
    /// Bug tracker reference; empty for tolerated behavior with no bug
    pub bug: &'static str,
    pub platform: Option<&'static str>,
    pub topology: Option<Topology>,
    pub test_suite: Option<&'static str>,
}

impl KnownProblem {
    fn new(pattern: &str, bug: &'static str) -> Self {
        Self {
            pattern: static_regex(pattern),
            bug,
            platform: None,
            topology: None,
            test_suite: None,
        }
    }

    fn on_topology(mut self, topology: Topology) -> Self {
        self.topology = Some(topology);
        self
    }

    fn in_suite(mut self, suite: &'static str) -> Self {
        self.test_suite = Some(suite);
        self
    }

    /// Whether the scopes declared by this entry match the run
    #[must_use]
    pub fn in_scope(&self, platform: &str, topology: Topology, test_suite: &str) -> bool {
        self.platform.is_none_or(|p| p == platform)
            && self.topology.is_none_or(|t| t == topology)
            && self.test_suite.is_none_or(|s| s == test_suite)
    }

    /// Whether `text` matches and the entry applies to this run
    #[must_use]
    pub fn applies(&self, text: &str, platform: &str, topology: Topology, test_suite: &str) -> bool {
        self.pattern.is_match(text) && self.in_scope(platform, topology, test_suite)
    }
}

const CNI_NOT_READY: &str = r"reason/NetworkNotReady network is not ready: container runtime network not ready: NetworkReady=false reason:NetworkPluginNotReady message:Network plugin returns error: No CNI configuration file in /etc/kubernetes/cni/net\.d/\. Has your network provider started\?";

/// Every known repeated-event problem, in match order
pub static KNOWN_EVENT_PROBLEMS: LazyLock<Vec<KnownProblem>> = LazyLock::new(|| {
    vec![
        KnownProblem::new(
            &format!(r"ns/openshift-multus pod/network-metrics-daemon-[a-z0-9]+ node/[a-z0-9.-]+ - {CNI_NOT_READY}"),
            "https://bugzilla.redhat.com/show_bug.cgi?id=1986370",
        ),
        KnownProblem::new(
            &format!(r"ns/openshift-e2e-loki pod/loki-promtail-[a-z0-9]+ node/[a-z0-9.-]+ - {CNI_NOT_READY}"),
            "https://bugzilla.redhat.com/show_bug.cgi?id=1986370",
        ),
        KnownProblem::new(
            &format!(r"ns/openshift-network-diagnostics pod/network-check-target-[a-z0-9]+ node/[a-z0-9.-]+ - {CNI_NOT_READY}"),
            "https://bugzilla.redhat.com/show_bug.cgi?id=1986370",
        ),
        KnownProblem::new(
            r"ns/.* service/.* - reason/FailedToDeleteOVNLoadBalancer .*",
            "https://bugzilla.redhat.com/show_bug.cgi?id=1990631",
        ),
        KnownProblem::new(
            r"ns/.*horizontalpodautoscaler.*failed to get cpu utilization: unable to get metrics for resource cpu: no metrics returned from resource metrics API.*",
            "https://bugzilla.redhat.com/show_bug.cgi?id=1993985",
        ),
        KnownProblem::new(
            r"ns/.*unable to ensure pod container exists: failed to create container.*slice already exists.*",
            "https://bugzilla.redhat.com/show_bug.cgi?id=1993980",
        ),
        KnownProblem::new(
            r"ns/openshift-etcd pod/etcd-quorum-guard-[a-z0-9-]+ node/[a-z0-9.-]+ - reason/Unhealthy Readiness probe failed: ",
            "https://bugzilla.redhat.com/show_bug.cgi?id=2000234",
        ),
        KnownProblem::new(
            r"ns/openshift-etcd pod/etcd-guard-.* node/.* - reason/ProbeError Readiness probe error: .* connect: connection refused",
            "https://bugzilla.redhat.com/show_bug.cgi?id=2075204",
        ),
        KnownProblem::new(
            r"ns/openshift-etcd-operator namespace/openshift-etcd-operator -.*rpc error: code = Canceled desc = grpc: the client connection is closing.*",
            "https://bugzilla.redhat.com/show_bug.cgi?id=2006975",
        ),
        KnownProblem::new(
            r"reason/TopologyAwareHintsDisabled",
            "https://issues.redhat.com/browse/OCPBUGS-5943",
        ),
        KnownProblem::new(
            r"ns/.*reason/.*APICheckFailed.*503.*",
            "https://bugzilla.redhat.com/show_bug.cgi?id=2017435",
        )
        .on_topology(Topology::SingleReplica),
        // Build tests roll the controller managers on every config change.
        KnownProblem::new(
            r"ns/openshift-route-controller-manager deployment/route-controller-manager - reason/ScalingReplicaSet \(combined from similar events\): Scaled (down|up) replica set route-controller-manager-[a-z0-9-]+ to [0-9]+",
            "",
        )
        .in_suite("openshift/build"),
        KnownProblem::new(
            r"ns/openshift-controller-manager deployment/controller-manager - reason/ScalingReplicaSet \(combined from similar events\): Scaled (down|up) replica set controller-manager-[a-z0-9-]+ to [0-9]+",
            "",
        )
        .in_suite("openshift/build"),
    ]
});
