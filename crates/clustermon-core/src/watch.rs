//! Watch runtime
//!
//! The runtime owns one task per watched kind plus a sampler task. An
//! external watcher (an informer, a replayed file, a test) pushes
//! [`Notification`]s through the bounded channels exposed by
//! [`RuntimeHandle`]; the tasks turn them into conditions and write them
//! to the shared [`Recorder`].
//!
//! ```text
//! watcher ─→ events channel ─→ event task ─→ detector ─→ classifier ─┐
//!         └→ pods channel   ─→ pod task   ─→ detectors ──────────────┼─→ Recorder
//!                              sampler task ─→ samplers ─────────────┘
//! ```
//!
//! Shutdown is cooperative: [`RuntimeHandle::shutdown`] raises a flag, the
//! tasks drain what is already queued and exit.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::cluster::{ClusterClient, node_roles};
use crate::conditions::{
    conditions_for_create, conditions_for_delete, conditions_for_update, observe_event,
    pending_too_long,
};
use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::pathological::ClassifierConfig;
use crate::recorder::{Recorder, Sampler};
use crate::resources::{Event, ObjectMeta, Pod, WatchedResource};

/// How long a task waits on its channel before rechecking the shutdown flag
const RECV_POLL: Duration = Duration::from_millis(25);
/// Granularity of the sampler's sleep between ticks
const SAMPLER_POLL: Duration = Duration::from_millis(50);
/// Upper bound on joining the tasks during shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Notifications
// =============================================================================

/// What happened to the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchAction {
    /// Part of the initial full list
    Sync,
    Added,
    Updated,
    Deleted,
}

/// One change delivered by a watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub action: WatchAction,
    pub resource: WatchedResource,
    /// Snapshot before the change, when the watcher has one
    pub previous: Option<WatchedResource>,
}

impl Notification {
    #[must_use]
    pub fn new(action: WatchAction, resource: impl Into<WatchedResource>) -> Self {
        Self {
            action,
            resource: resource.into(),
            previous: None,
        }
    }

    #[must_use]
    pub fn with_previous(mut self, previous: impl Into<WatchedResource>) -> Self {
        self.previous = Some(previous.into());
        self
    }
}

/// Skips objects whose version was already processed.
///
/// Applies to the initial list and to incremental notifications alike.
/// Objects without a uid or resource version are always processed.
#[derive(Debug, Default)]
pub struct SourceDeduper {
    versions: HashMap<String, String>,
}

impl SourceDeduper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the notification carries a version not seen before
    pub fn should_process(&mut self, action: WatchAction, meta: &ObjectMeta) -> bool {
        if meta.uid.is_empty() || meta.resource_version.is_empty() {
            return true;
        }
        if action == WatchAction::Deleted {
            self.versions.remove(&meta.uid);
            return true;
        }
        if self.versions.get(&meta.uid) == Some(&meta.resource_version) {
            return false;
        }
        self.versions
            .insert(meta.uid.clone(), meta.resource_version.clone());
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

// =============================================================================
// Runtime
// =============================================================================

/// Last known snapshot of every live pod, keyed by `namespace/name`
type PodCache = Arc<Mutex<BTreeMap<String, Pod>>>;

/// Builder for the ingestion tasks
pub struct MonitorRuntime<C> {
    recorder: Recorder,
    config: MonitorConfig,
    classifier: Arc<ClassifierConfig>,
    client: Option<Arc<C>>,
}

impl<C: ClusterClient + 'static> MonitorRuntime<C> {
    #[must_use]
    pub fn new(
        recorder: Recorder,
        config: MonitorConfig,
        classifier: Arc<ClassifierConfig>,
        client: Option<Arc<C>>,
    ) -> Self {
        Self {
            recorder,
            config,
            classifier,
            client,
        }
    }

    /// Spawn the event, pod and sampler tasks.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(self) -> RuntimeHandle {
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let capacity = self.config.events.channel_capacity;
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (pod_tx, pod_rx) = mpsc::channel(capacity);

        let pods: PodCache = Arc::default();
        self.recorder
            .add_sampler(pending_pod_sampler(Arc::clone(&pods), self.config.pods.pending_warning()));

        let event_task = self.spawn_event_task(event_rx, Arc::clone(&shutdown_flag));
        let pod_task = self.spawn_pod_task(pod_rx, pods, Arc::clone(&shutdown_flag));
        let sampler_task = self.spawn_sampler_task(Arc::clone(&shutdown_flag));
        info!(capacity, "monitor runtime started");

        RuntimeHandle {
            events: event_tx,
            pods: pod_tx,
            event_task,
            pod_task,
            sampler_task,
            shutdown_flag,
        }
    }

    fn spawn_event_task(
        &self,
        mut rx: mpsc::Receiver<Notification>,
        shutdown_flag: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let recorder = self.recorder.clone();
        let classifier = Arc::clone(&self.classifier);
        let client = self.client.clone();
        let window = self.config.events.staleness_window();

        tokio::spawn(async move {
            let mut deduper = SourceDeduper::new();
            while let Some(notification) = next_notification(&mut rx, &shutdown_flag).await {
                let event = match notification.resource {
                    WatchedResource::Event(event) => event,
                    other => {
                        debug!(kind = other.kind(), "event task: dropping unexpected resource");
                        continue;
                    }
                };
                if !deduper.should_process(notification.action, &event.metadata) {
                    continue;
                }
                match notification.action {
                    WatchAction::Sync => recorder.record_resource(WatchedResource::Event(event)),
                    WatchAction::Added | WatchAction::Updated => {
                        ingest_event(&recorder, &classifier, client.as_deref(), &event, window)
                            .await;
                        recorder.record_resource(WatchedResource::Event(event));
                    }
                    WatchAction::Deleted => {}
                }
            }
            debug!("event task exited");
        })
    }

    fn spawn_pod_task(
        &self,
        mut rx: mpsc::Receiver<Notification>,
        pods: PodCache,
        shutdown_flag: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let recorder = self.recorder.clone();

        tokio::spawn(async move {
            let mut deduper = SourceDeduper::new();
            while let Some(notification) = next_notification(&mut rx, &shutdown_flag).await {
                let pod = match notification.resource {
                    WatchedResource::Pod(pod) => pod,
                    other => {
                        debug!(kind = other.kind(), "pod task: dropping unexpected resource");
                        continue;
                    }
                };
                if !deduper.should_process(notification.action, &pod.metadata) {
                    continue;
                }
                let previous = match notification.previous {
                    Some(WatchedResource::Pod(previous)) => Some(*previous),
                    _ => None,
                };
                ingest_pod(&recorder, &pods, notification.action, *pod, previous);
            }
            debug!("pod task exited");
        })
    }

    fn spawn_sampler_task(&self, shutdown_flag: Arc<AtomicBool>) -> JoinHandle<()> {
        let recorder = self.recorder.clone();
        let tick = self.config.recorder.sampler_interval();

        tokio::spawn(async move {
            loop {
                let deadline = Instant::now() + tick;
                while !shutdown_flag.load(Ordering::SeqCst) && Instant::now() < deadline {
                    sleep(SAMPLER_POLL.min(tick)).await;
                }
                if shutdown_flag.load(Ordering::SeqCst) {
                    debug!("sampler task: shutdown signal received");
                    break;
                }
                recorder.run_samplers(Utc::now());
            }
        })
    }
}

/// Next queued notification, or `None` once the channel closed or shutdown
/// was requested and the queue is drained.
async fn next_notification(
    rx: &mut mpsc::Receiver<Notification>,
    shutdown_flag: &AtomicBool,
) -> Option<Notification> {
    loop {
        match timeout(RECV_POLL, rx.recv()).await {
            Ok(next) => return next,
            Err(_elapsed) => {
                if shutdown_flag.load(Ordering::SeqCst) && rx.is_empty() {
                    return None;
                }
            }
        }
    }
}

async fn ingest_event<C: ClusterClient>(
    recorder: &Recorder,
    classifier: &ClassifierConfig,
    client: Option<&C>,
    event: &Event,
    window: chrono::Duration,
) {
    let roles = match client {
        Some(client) if event.involved_object.kind == "Node" => {
            node_roles(client, &event.involved_object.name).await
        }
        _ => None,
    };
    let Some(observation) = observe_event(event, Utc::now(), window, roles.as_deref()) else {
        debug!(uid = %event.metadata.uid, "dropping stale event");
        return;
    };

    let placement = classifier.place(&observation.condition, observation.count);
    let condition = placement.label(observation.condition.clone());
    if placement.is_widened() {
        info!(
            locator = %condition.locator,
            count = observation.count,
            ?placement,
            "pathological event"
        );
        let (from, to) = observation.pathological_window();
        let handle = recorder.start_interval(from, condition);
        recorder.end_interval(handle, to);
    } else {
        recorder.record_at(observation.observed_at, condition);
    }
}

fn ingest_pod(
    recorder: &Recorder,
    pods: &PodCache,
    action: WatchAction,
    pod: Pod,
    previous: Option<Pod>,
) {
    let key = pod.metadata.key();
    let now = Utc::now();
    let mut cache = pods.lock().unwrap_or_else(PoisonError::into_inner);
    // An initial-list pod may have started before the watch did; treat it
    // as a create unless an older snapshot is already cached.
    let conditions = match action {
        WatchAction::Sync | WatchAction::Added | WatchAction::Updated => {
            match previous.as_ref().or_else(|| cache.get(&key)) {
                Some(old) => conditions_for_update(&pod, old),
                None => conditions_for_create(&pod),
            }
        }
        WatchAction::Deleted => conditions_for_delete(&pod),
    };
    if action == WatchAction::Deleted {
        cache.remove(&key);
    } else {
        cache.insert(key, pod.clone());
    }
    drop(cache);

    recorder.record_all_at(now, conditions);
    recorder.record_resource(WatchedResource::Pod(Box::new(pod)));
}

fn pending_pod_sampler(pods: PodCache, threshold: chrono::Duration) -> Sampler {
    Arc::new(move |now| {
        let cache = pods.lock().unwrap_or_else(PoisonError::into_inner);
        pending_too_long(cache.values(), now, threshold)
    })
}

// =============================================================================
// Handle
// =============================================================================

/// Senders and task handles of a running [`MonitorRuntime`]
#[derive(Debug)]
pub struct RuntimeHandle {
    events: mpsc::Sender<Notification>,
    pods: mpsc::Sender<Notification>,
    event_task: JoinHandle<()>,
    pod_task: JoinHandle<()>,
    sampler_task: JoinHandle<()>,
    shutdown_flag: Arc<AtomicBool>,
}

impl RuntimeHandle {
    /// Sender for cluster event notifications
    #[must_use]
    pub fn event_sender(&self) -> mpsc::Sender<Notification> {
        self.events.clone()
    }

    /// Sender for pod notifications
    #[must_use]
    pub fn pod_sender(&self) -> mpsc::Sender<Notification> {
        self.pods.clone()
    }

    /// Route a notification to the task for its kind.
    pub async fn send(&self, notification: Notification) -> Result<()> {
        if self.is_shutting_down() {
            return Err(Error::Runtime("monitor runtime is shutting down".to_string()));
        }
        let sender = match notification.resource {
            WatchedResource::Event(_) => &self.events,
            WatchedResource::Pod(_) => &self.pods,
        };
        sender
            .send(notification)
            .await
            .map_err(|_| Error::Runtime("watch channel closed".to_string()))
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    /// Signal shutdown without waiting.
    pub fn signal_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
    }

    /// Signal shutdown, let the tasks drain their queues and join them.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_within(SHUTDOWN_TIMEOUT).await
    }

    /// [`shutdown`](Self::shutdown) with an explicit join deadline.
    ///
    /// Tasks still running at the deadline are aborted, so once this
    /// returns no task writes to the recorder again.
    pub async fn shutdown_within(self, limit: Duration) -> Result<()> {
        self.signal_shutdown();
        let Self {
            events,
            pods,
            event_task,
            pod_task,
            sampler_task,
            ..
        } = self;
        drop(events);
        drop(pods);

        let mut tasks = [event_task, pod_task, sampler_task];
        let joined = timeout(limit, async {
            let mut failure = None;
            for task in &mut tasks {
                if let Err(err) = task.await {
                    failure.get_or_insert(err);
                }
            }
            failure
        })
        .await;
        match joined {
            Ok(None) => {
                info!("monitor runtime stopped");
                Ok(())
            }
            Ok(Some(err)) => Err(Error::Runtime(format!("watch task failed: {err}"))),
            Err(_elapsed) => {
                let pending = tasks.iter().filter(|task| !task.is_finished()).count();
                for task in &tasks {
                    task.abort();
                }
                warn!(pending, ?limit, "watch tasks did not stop in time; aborted");
                Err(Error::Runtime(format!(
                    "{pending} watch tasks did not stop within {limit:?}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterInfo, Infrastructure, StaticCluster};
    use crate::error::ClusterError;
    use crate::config::ClassifierSettings;
    use crate::resources::{
        ContainerState, ContainerStateRunning, ContainerStatus, EventSource, Node,
        ObjectReference, PodPhase,
    };

    fn meta(name: &str, uid: &str, version: &str) -> ObjectMeta {
        ObjectMeta {
            name: name.to_string(),
            namespace: "openshift-dns".to_string(),
            uid: uid.to_string(),
            resource_version: version.to_string(),
            creation_timestamp: Some(Utc::now()),
            ..ObjectMeta::default()
        }
    }

    fn pod(version: &str) -> Pod {
        let mut pod = Pod {
            metadata: meta("dns-1", "pod-uid", version),
            ..Pod::default()
        };
        pod.spec.node_name = "worker-1".to_string();
        pod
    }

    fn event(reason: &str, message: &str, count: i32) -> Event {
        Event {
            metadata: meta("dns-1.abc", &format!("event-{reason}-{count}"), "1"),
            involved_object: ObjectReference {
                kind: "Pod".to_string(),
                namespace: "openshift-dns".to_string(),
                name: "dns-1".to_string(),
                ..ObjectReference::default()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            source: EventSource::default(),
            first_timestamp: Some(Utc::now() - chrono::Duration::seconds(30)),
            last_timestamp: Some(Utc::now()),
            count,
            event_type: "Warning".to_string(),
            ..Event::default()
        }
    }

    /// Answers node lookups only after `delay`
    struct SlowNodes {
        delay: Duration,
    }

    impl ClusterClient for SlowNodes {
        async fn infrastructure(&self) -> std::result::Result<Infrastructure, ClusterError> {
            Ok(Infrastructure::default())
        }

        async fn node(&self, _name: &str) -> std::result::Result<Node, ClusterError> {
            sleep(self.delay).await;
            Ok(Node::default())
        }

        async fn etcd_node_revisions(&self) -> std::result::Result<Vec<i64>, ClusterError> {
            Ok(Vec::new())
        }

        async fn install_completion_time(
            &self,
        ) -> std::result::Result<Option<chrono::DateTime<Utc>>, ClusterError> {
            Ok(None)
        }

        async fn list_events(&self, _namespace: &str) -> std::result::Result<Vec<Event>, ClusterError> {
            Ok(Vec::new())
        }
    }

    fn start(recorder: &Recorder) -> RuntimeHandle {
        start_with::<StaticCluster>(recorder, None)
    }

    fn start_with<C: ClusterClient + 'static>(
        recorder: &Recorder,
        client: Option<Arc<C>>,
    ) -> RuntimeHandle {
        let settings = ClassifierSettings::default();
        let classifier = ClassifierConfig::online(Arc::new(ClusterInfo::offline(&settings)), &settings);
        MonitorRuntime::new(recorder.clone(), MonitorConfig::default(), Arc::new(classifier), client)
            .start()
    }

    #[test]
    fn deduper_skips_unchanged_versions() {
        let mut deduper = SourceDeduper::new();
        let first = meta("a", "uid-1", "10");
        assert!(deduper.should_process(WatchAction::Sync, &first));
        assert!(!deduper.should_process(WatchAction::Updated, &first));
        assert!(deduper.should_process(WatchAction::Updated, &meta("a", "uid-1", "11")));
        assert!(deduper.should_process(WatchAction::Deleted, &meta("a", "uid-1", "11")));
        assert!(deduper.is_empty());
        assert!(deduper.should_process(WatchAction::Added, &meta("a", "", "")));
        assert!(deduper.should_process(WatchAction::Added, &meta("a", "", "")));
    }

    #[tokio::test]
    async fn pod_lifecycle_is_recorded() {
        let recorder = Recorder::new();
        let handle = start(&recorder);

        let mut running = pod("2");
        running.status.phase = PodPhase::Running;
        running.status.container_statuses = vec![ContainerStatus {
            name: "dns".to_string(),
            ready: true,
            state: ContainerState {
                running: Some(ContainerStateRunning::default()),
                ..ContainerState::default()
            },
            ..ContainerStatus::default()
        }];

        handle.send(Notification::new(WatchAction::Added, pod("1"))).await.unwrap();
        handle.send(Notification::new(WatchAction::Updated, running.clone())).await.unwrap();
        handle.send(Notification::new(WatchAction::Updated, running.clone())).await.unwrap();
        handle.send(Notification::new(WatchAction::Deleted, running)).await.unwrap();
        handle.shutdown().await.unwrap();

        let messages: Vec<String> = recorder
            .intervals(None, None)
            .iter()
            .map(|i| i.message().to_string())
            .collect();
        assert!(messages.iter().any(|m| m == "reason/Created"));
        assert!(messages.iter().any(|m| m.starts_with("reason/ContainerStart")));
        assert!(messages.iter().any(|m| m == "reason/Deleted"));
        assert_eq!(messages.iter().filter(|m| m.starts_with("reason/ContainerStart")).count(), 1);
        assert!(recorder.current_resource_state()["pods"].contains_key("openshift-dns/dns-1"));
    }

    #[tokio::test]
    async fn repeated_events_are_widened_and_labeled() {
        let recorder = Recorder::new();
        let handle = start(&recorder);

        let sender = handle.event_sender();
        sender
            .send(Notification::new(
                WatchAction::Added,
                event("BackOff", "Back-off restarting failed container", 3),
            ))
            .await
            .unwrap();
        sender
            .send(Notification::new(WatchAction::Added, event("Boom", "it broke", 21)))
            .await
            .unwrap();
        sender
            .send(Notification::new(WatchAction::Added, event("Quiet", "once", 1)))
            .await
            .unwrap();
        drop(sender);
        handle.shutdown().await.unwrap();

        let intervals = recorder.intervals(None, None);
        assert_eq!(intervals.len(), 3);
        let known = intervals
            .iter()
            .find(|i| i.message().contains("BackOff"))
            .unwrap();
        assert!(known.message().starts_with("pathological/true interesting/true "));
        assert_eq!((known.to() - known.from()).num_seconds(), 1);

        let new = intervals.iter().find(|i| i.message().contains("Boom")).unwrap();
        assert_eq!(new.message(), "pathological/true reason/Boom it broke (21 times)");
        assert!(new.locator().contains(" hmsg/"));

        let plain = intervals.iter().find(|i| i.message().contains("Quiet")).unwrap();
        assert!(plain.is_instant());
    }

    #[tokio::test]
    async fn node_events_carry_roles() {
        let mut labels = BTreeMap::new();
        labels.insert("node-role.kubernetes.io/master".to_string(), String::new());
        let node = Node {
            metadata: ObjectMeta {
                name: "master-0".to_string(),
                labels,
                ..ObjectMeta::default()
            },
        };
        let client = Arc::new(StaticCluster::new().with_node(node));
        let recorder = Recorder::new();
        let handle = start_with(&recorder, Some(client));

        let mut node_event = event("NodeReady", "Node master-0 status is now: NodeReady", 1);
        node_event.involved_object = ObjectReference {
            kind: "Node".to_string(),
            name: "master-0".to_string(),
            ..ObjectReference::default()
        };
        node_event.metadata.namespace = String::new();
        handle.send(Notification::new(WatchAction::Added, node_event)).await.unwrap();
        handle.shutdown().await.unwrap();

        let intervals = recorder.intervals(None, None);
        assert_eq!(intervals.len(), 1);
        assert_eq!(
            intervals[0].message(),
            "reason/NodeReady roles/master Node master-0 status is now: NodeReady"
        );
    }

    #[tokio::test]
    async fn synced_events_record_resources_only() {
        let recorder = Recorder::new();
        let handle = start(&recorder);
        handle
            .send(Notification::new(WatchAction::Sync, event("Boom", "it broke", 21)))
            .await
            .unwrap();
        handle.shutdown().await.unwrap();

        assert!(recorder.is_empty());
        assert_eq!(recorder.current_resource_state()["events"].len(), 1);
    }

    fn running_not_ready() -> Pod {
        let mut running = pod("1");
        running.status.phase = PodPhase::Running;
        running.status.container_statuses = vec![ContainerStatus {
            name: "dns".to_string(),
            ready: false,
            state: ContainerState {
                running: Some(ContainerStateRunning::default()),
                ..ContainerState::default()
            },
            ..ContainerStatus::default()
        }];
        running
    }

    async fn pod_messages(action: WatchAction) -> Vec<String> {
        let recorder = Recorder::new();
        let handle = start(&recorder);
        handle.send(Notification::new(action, running_not_ready())).await.unwrap();
        handle.shutdown().await.unwrap();
        assert_eq!(recorder.current_resource_state()["pods"].len(), 1);
        recorder
            .intervals(None, None)
            .iter()
            .map(|i| i.message().to_string())
            .collect()
    }

    #[tokio::test]
    async fn initial_list_pods_run_create_detectors() {
        let synced = pod_messages(WatchAction::Sync).await;
        let added = pod_messages(WatchAction::Added).await;
        assert_eq!(synced.len(), added.len());
        let mut synced_sorted = synced.clone();
        let mut added_sorted = added;
        synced_sorted.sort();
        added_sorted.sort();
        assert_eq!(synced_sorted, added_sorted);
        for expected in ["reason/Created", "reason/Scheduled", "reason/ContainerStart", "reason/NotReady"] {
            assert!(
                synced.iter().any(|m| m.starts_with(expected)),
                "missing {expected} in {synced:?}"
            );
        }
    }

    #[tokio::test]
    async fn resync_of_a_cached_pod_is_an_update() {
        let recorder = Recorder::new();
        let handle = start(&recorder);
        handle.send(Notification::new(WatchAction::Sync, running_not_ready())).await.unwrap();
        let mut resynced = running_not_ready();
        resynced.metadata.resource_version = "2".to_string();
        handle.send(Notification::new(WatchAction::Sync, resynced)).await.unwrap();
        handle.shutdown().await.unwrap();

        let created = recorder
            .intervals(None, None)
            .iter()
            .filter(|i| i.message() == "reason/Created")
            .count();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn stuck_tasks_are_aborted_at_the_shutdown_deadline() {
        let recorder = Recorder::new();
        let client = Arc::new(SlowNodes {
            delay: Duration::from_millis(400),
        });
        let handle = start_with(&recorder, Some(client));

        let mut node_event = event("NodeNotReady", "Node worker-1 status is now: NodeNotReady", 1);
        node_event.involved_object = ObjectReference {
            kind: "Node".to_string(),
            name: "worker-1".to_string(),
            ..ObjectReference::default()
        };
        node_event.metadata.namespace = String::new();
        handle.send(Notification::new(WatchAction::Added, node_event)).await.unwrap();

        let result = handle.shutdown_within(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::Runtime(_))));

        let recorded = recorder.len();
        sleep(Duration::from_millis(600)).await;
        assert_eq!(recorder.len(), recorded);
        assert_eq!(recorded, 0);
    }

    #[tokio::test]
    async fn send_after_shutdown_signal_is_rejected() {
        let recorder = Recorder::new();
        let handle = start(&recorder);
        handle.signal_shutdown();
        let result = handle.send(Notification::new(WatchAction::Added, pod("1"))).await;
        assert!(matches!(result, Err(Error::Runtime(_))));
        handle.shutdown().await.unwrap();
    }
}
