//! Locators: ordered `kind/name` tokens naming the resources a condition
//! concerns. Token order is part of the identity; patterns and the
//! pathological backfill both match on the full string.

use std::collections::BTreeMap;

use crate::resources::{Event, Pod};

/// `ns/<ns> pod/<name> node/<node> uid/<uid>`
#[must_use]
pub fn locate_pod(pod: &Pod) -> String {
    format!(
        "ns/{} pod/{} node/{} uid/{}",
        pod.metadata.namespace, pod.metadata.name, pod.spec.node_name, pod.metadata.uid
    )
}

/// Pod locator followed by `container/<name>`
#[must_use]
pub fn locate_pod_container(pod: &Pod, container: &str) -> String {
    format!("{} container/{container}", locate_pod(pod))
}

/// Locator of the object an event is about
#[must_use]
pub fn locate_event(event: &Event) -> String {
    let object = &event.involved_object;
    let kind = object.kind.to_lowercase();
    let host = &event.source.host;

    if !object.namespace.is_empty() {
        if !host.is_empty() && object.kind == "Pod" {
            return format!("ns/{} {kind}/{} node/{host}", object.namespace, object.name);
        }
        return format!("ns/{} {kind}/{}", object.namespace, object.name);
    }
    if !host.is_empty() && object.kind == "Node" {
        return format!("{kind}/{} node/{host}", object.name);
    }
    format!("{kind}/{}", object.name)
}

/// Split a locator into a `kind → name` map; later tokens win on repeats.
#[must_use]
pub fn locator_parts(locator: &str) -> BTreeMap<&str, &str> {
    locator
        .split_whitespace()
        .filter_map(|token| token.split_once('/'))
        .collect()
}

/// Value of the `ns/` token, if any
#[must_use]
pub fn namespace(locator: &str) -> Option<&str> {
    locator
        .split_whitespace()
        .find_map(|token| token.strip_prefix("ns/"))
}

/// Whether the locator points into an end-to-end test namespace
#[must_use]
pub fn is_in_e2e_namespace(locator: &str) -> bool {
    locator.contains("ns/e2e-")
}
