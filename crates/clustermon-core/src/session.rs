//! Monitor session
//!
//! [`MonitorSession`] drives one run: `start` gathers cluster facts and
//! spawns the watch runtime, `end` stops ingestion and finalizes the
//! timeline, `evaluate` turns the timeline into verdicts.
//!
//! Finalization happens strictly after every ingestion task has stopped:
//!
//! 1. take the recorder's timeline
//! 2. label earlier occurrences of new pathological repeats
//! 3. merge interval files written by other test processes, cut to the run
//! 4. sort and clamp to `[start, end]`

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cluster::{ClusterClient, ClusterInfo, StaticCluster};
use crate::config::MonitorConfig;
use crate::error::{Result, SessionError};
use crate::interval::Intervals;
use crate::pathological::{ClassifierConfig, mark_missed_pathological, run_threshold_checks};
use crate::recorder::Recorder;
use crate::resources::ResourcesMap;
use crate::serialization::read_intervals_file;
use crate::verdict::{Verdict, check_error_level};
use crate::watch::{MonitorRuntime, RuntimeHandle};

/// One monitored run
#[derive(Debug)]
pub struct MonitorSession<C = StaticCluster> {
    config: MonitorConfig,
    client: Option<Arc<C>>,
    recorder: Recorder,
    runtime: Option<RuntimeHandle>,
    cluster: Arc<ClusterInfo>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    intervals: Intervals,
    resources: ResourcesMap,
}

impl MonitorSession<StaticCluster> {
    /// Session with no cluster client; scoped allowances are permissive.
    #[must_use]
    pub fn offline(config: MonitorConfig) -> Self {
        Self::new(config, None)
    }
}

impl<C: ClusterClient + 'static> MonitorSession<C> {
    #[must_use]
    pub fn new(config: MonitorConfig, client: Option<Arc<C>>) -> Self {
        let cluster = Arc::new(ClusterInfo::offline(&config.classifier));
        Self {
            config,
            client,
            recorder: Recorder::new(),
            runtime: None,
            cluster,
            started_at: None,
            ended_at: None,
            intervals: Intervals::new(),
            resources: ResourcesMap::new(),
        }
    }

    /// Gather cluster facts and start ingestion.
    pub async fn start(&mut self) -> Result<()> {
        if self.started_at.is_some() {
            return Err(SessionError::AlreadyStarted.into());
        }
        self.cluster = Arc::new(self.fetch_cluster().await);
        let classifier = ClassifierConfig::online(Arc::clone(&self.cluster), &self.config.classifier);
        let runtime = MonitorRuntime::new(
            self.recorder.clone(),
            self.config.clone(),
            Arc::new(classifier),
            self.client.clone(),
        );
        self.runtime = Some(runtime.start());
        let started_at = Utc::now();
        self.started_at = Some(started_at);
        info!(started_at = %started_at.to_rfc3339(), "monitor session started");
        Ok(())
    }

    /// The running watch runtime; `None` before `start` and after `end`
    #[must_use]
    pub fn runtime(&self) -> Option<&RuntimeHandle> {
        self.runtime.as_ref()
    }

    /// The shared recorder, for callers that record conditions directly
    #[must_use]
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Stop ingestion and finalize the timeline.
    ///
    /// `artifact_dir` is searched recursively for interval files written by
    /// other test processes during the run.
    pub async fn end(&mut self, artifact_dir: Option<&Path>) -> Result<()> {
        let Some(started_at) = self.started_at else {
            return Err(SessionError::NotStarted.into());
        };
        if self.ended_at.is_some() {
            return Err(SessionError::AlreadyEnded.into());
        }
        let ended_at = Utc::now().max(started_at);
        self.ended_at = Some(ended_at);

        if let Some(runtime) = self.runtime.take() {
            if let Err(err) = runtime.shutdown().await {
                warn!(error = %err, hint = err.hint(), "watch runtime did not stop cleanly");
            }
        }

        self.resources = self.recorder.current_resource_state();
        let mut intervals = self.recorder.intervals(None, None);
        let marked = mark_missed_pathological(&mut intervals);

        if let Some(dir) = artifact_dir {
            let additional =
                read_additional_intervals(dir, &self.config.run.additional_events_prefix);
            if !additional.is_empty() {
                info!(intervals = additional.len(), "merging additional intervals");
                intervals.extend(additional.cut(started_at, ended_at));
            }
        }

        intervals.sort();
        intervals.clamp(started_at, ended_at);
        self.intervals = intervals;

        self.cluster = Arc::new(self.fetch_cluster().await);
        info!(
            intervals = self.intervals.len(),
            marked,
            "monitor session ended"
        );
        Ok(())
    }

    async fn fetch_cluster(&self) -> ClusterInfo {
        ClusterInfo::fetch(self.client.as_deref(), &self.config.classifier).await
    }

    /// Finalized timeline; empty until `end` has run
    #[must_use]
    pub fn intervals(&self) -> &Intervals {
        &self.intervals
    }

    /// Last known state of every recorded resource at `end`
    #[must_use]
    pub fn recorded_resources(&self) -> &ResourcesMap {
        &self.resources
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Cluster facts used by the evaluator
    #[must_use]
    pub fn cluster(&self) -> &ClusterInfo {
        &self.cluster
    }

    /// Every verdict for the finalized timeline.
    #[must_use]
    pub fn evaluate(&self) -> Vec<Verdict> {
        let classifier = ClassifierConfig::for_run(
            self.config.classifier.mode,
            Arc::clone(&self.cluster),
            &self.config.classifier,
        );
        let mut verdicts = check_error_level(&self.intervals);
        verdicts.extend(classifier.check_all(&self.intervals));
        verdicts.extend(run_threshold_checks(&self.intervals));
        debug!(verdicts = verdicts.len(), "evaluation complete");
        verdicts
    }
}

/// Intervals from every readable file under `dir` whose name starts with
/// `prefix`. Unreadable entries and files are skipped.
fn read_additional_intervals(dir: &Path, prefix: &str) -> Intervals {
    let mut additional = Intervals::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() || !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }
        match read_intervals_file(entry.path()) {
            Ok(saved) => additional.extend(saved),
            Err(err) => warn!(
                path = %entry.path().display(),
                error = %err,
                "skipping unreadable additional intervals file"
            ),
        }
    }
    additional
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::interval::{Condition, EventInterval};
    use crate::pathological::CORE_CHECK_NAME;
    use crate::resources::{Event, ObjectMeta, ObjectReference};
    use crate::serialization::write_intervals_file;
    use crate::verdict::{MONITOR_CHECK_NAME, Outcome, outcome_of};
    use crate::watch::{Notification, WatchAction};

    fn backoff_event(count: i32) -> Event {
        let now = Utc::now();
        Event {
            metadata: ObjectMeta {
                name: "etcd-0.1".to_string(),
                namespace: "openshift-etcd".to_string(),
                uid: format!("uid-{count}"),
                resource_version: "1".to_string(),
                ..ObjectMeta::default()
            },
            involved_object: ObjectReference {
                kind: "Pod".to_string(),
                namespace: "openshift-etcd".to_string(),
                name: "etcd-0".to_string(),
                ..ObjectReference::default()
            },
            reason: "BackOff".to_string(),
            message: "Back-off restarting failed container".to_string(),
            first_timestamp: Some(now),
            last_timestamp: Some(now),
            count,
            event_type: "Warning".to_string(),
            ..Event::default()
        }
    }

    #[tokio::test]
    async fn lifecycle_errors() {
        let mut session = MonitorSession::offline(MonitorConfig::default());
        assert!(matches!(
            session.end(None).await,
            Err(Error::Session(SessionError::NotStarted))
        ));
        session.start().await.unwrap();
        assert!(matches!(
            session.start().await,
            Err(Error::Session(SessionError::AlreadyStarted))
        ));
        session.end(None).await.unwrap();
        assert!(matches!(
            session.end(None).await,
            Err(Error::Session(SessionError::AlreadyEnded))
        ));
        assert!(session.runtime().is_none());
    }

    #[tokio::test]
    async fn quiet_run_passes_everything() {
        let mut session = MonitorSession::offline(MonitorConfig::default());
        session.start().await.unwrap();
        session.end(None).await.unwrap();
        let verdicts = session.evaluate();
        assert!(verdicts.iter().all(|v| !v.is_failure()));
        assert_eq!(outcome_of(&verdicts, CORE_CHECK_NAME), Some(Outcome::Pass));
        assert_eq!(outcome_of(&verdicts, MONITOR_CHECK_NAME), Some(Outcome::Pass));
    }

    #[tokio::test]
    async fn ingested_events_reach_the_verdicts() {
        let mut session = MonitorSession::offline(MonitorConfig::default());
        session.start().await.unwrap();
        let runtime = session.runtime().unwrap();
        runtime
            .send(Notification::new(WatchAction::Added, backoff_event(56)))
            .await
            .unwrap();
        session.end(None).await.unwrap();

        assert_eq!(session.intervals().len(), 1);
        assert!(session.recorded_resources().contains_key("events"));
        let verdicts = session.evaluate();
        assert_eq!(outcome_of(&verdicts, CORE_CHECK_NAME), Some(Outcome::Pass));
        assert_eq!(
            outcome_of(
                &verdicts,
                "[sig-cluster-lifecycle] should not see excessive Back-off restarting failed containers"
            ),
            Some(Outcome::Fail)
        );
    }

    #[tokio::test]
    async fn additional_interval_files_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("upgrade");
        std::fs::create_dir_all(&nested).unwrap();

        let mut session = MonitorSession::offline(MonitorConfig::default());
        session.start().await.unwrap();
        let now = Utc::now();

        let inside: Intervals = vec![EventInterval::instant(
            Condition::error("ns/e2e-upgrade", "disruption observed"),
            now,
        )]
        .into();
        let outside: Intervals = vec![EventInterval::instant(
            Condition::info("ns/e2e-upgrade", "long before the run"),
            now - chrono::Duration::hours(3),
        )]
        .into();
        write_intervals_file(&nested.join("AdditionalEvents__upgrade.json"), &inside).unwrap();
        write_intervals_file(&dir.path().join("AdditionalEvents__old.json"), &outside).unwrap();
        write_intervals_file(&dir.path().join("e2e-events.json"), &inside).unwrap();
        std::fs::write(dir.path().join("AdditionalEvents__broken.json"), "not json").unwrap();

        session.end(Some(dir.path())).await.unwrap();
        let messages: Vec<_> = session.intervals().iter().map(|i| i.message()).collect();
        assert_eq!(messages, vec!["disruption observed"]);
        assert_eq!(
            outcome_of(&session.evaluate(), MONITOR_CHECK_NAME),
            Some(Outcome::Flake)
        );
    }
}
