// src/core/pipeline.rs
//! Import orchestration
//!
//! A [`Pipeline`] run takes a repository identifier to a stored [`Graph`]:
//! slot acquisition, fetch, file-count check, transform, quota check, save.
//! Everything after the slot is raced against one global timeout, and every
//! run ends with exactly one terminal progress event.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{RepographError, Result};
use super::fetcher::{FetchResult, TreeFetcher};
use super::model::{Graph, GraphSummary, Stage};
use super::repo_url::{parse_repo_url, RepoRef};
use super::store::GraphStore;
use super::transform::{transform_entries, TransformResult, TransformSettings};

/// Per-caller ceiling on simultaneous imports
///
/// Construct once and share; every pipeline holding the same limiter sees the
/// same counts.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    limit: usize,
    in_flight: Mutex<HashMap<String, usize>>,
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Claim a slot, or fail immediately when the caller is at the ceiling
    pub fn try_acquire(self: &Arc<Self>, caller_id: &str) -> Result<SlotGuard> {
        let mut in_flight = self.in_flight.lock();
        let count = in_flight.entry(caller_id.to_string()).or_insert(0);
        if *count >= self.limit {
            return Err(RepographError::ConcurrencyLimit { limit: self.limit });
        }
        *count += 1;
        debug!("Caller {} now has {} import(s) in flight", caller_id, count);

        Ok(SlotGuard {
            limiter: Arc::clone(self),
            caller_id: caller_id.to_string(),
        })
    }

    pub fn active(&self, caller_id: &str) -> usize {
        self.in_flight.lock().get(caller_id).copied().unwrap_or(0)
    }

    fn release(&self, caller_id: &str) {
        let mut in_flight = self.in_flight.lock();
        if let Some(count) = in_flight.get_mut(caller_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                in_flight.remove(caller_id);
            }
        }
    }
}

/// Held for the lifetime of one run; releases its slot on drop
#[derive(Debug)]
pub struct SlotGuard {
    limiter: Arc<ConcurrencyLimiter>,
    caller_id: String,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.limiter.release(&self.caller_id);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress {
        stage: Stage,
        progress: u8,
        detail: String,
    },
    Complete {
        graph: GraphSummary,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress { .. })
    }
}

/// Non-blocking sink for progress events
///
/// Intermediate events are dropped when the channel is full or closed. The
/// terminal event is handed to a background task when the channel is full so
/// it still arrives once the listener catches up.
#[derive(Debug, Default)]
pub struct ProgressReporter {
    sender: Option<mpsc::Sender<ProgressEvent>>,
    high_water: AtomicU8,
}

impl ProgressReporter {
    pub fn new(sender: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            sender: Some(sender),
            high_water: AtomicU8::new(0),
        }
    }

    /// Reporter that discards everything
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }

    /// Report a percentage; values below the highest already reported are raised to it
    pub fn progress(&self, stage: Stage, percent: u8, detail: impl Into<String>) {
        let percent = percent.min(100);
        let previous = self.high_water.fetch_max(percent, Ordering::SeqCst);
        let progress = percent.max(previous);
        let detail = detail.into();
        debug!("[{}] {}% {}", stage, progress, detail);

        if let Some(sender) = &self.sender {
            let _ = sender.try_send(ProgressEvent::Progress { stage, progress, detail });
        }
    }

    pub fn complete(&self, graph: GraphSummary) {
        self.finish(ProgressEvent::Complete { graph });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.finish(ProgressEvent::Error { message: message.into() });
    }

    fn finish(&self, event: ProgressEvent) {
        let Some(sender) = &self.sender else {
            return;
        };

        if let Err(mpsc::error::TrySendError::Full(event)) = sender.try_send(event) {
            let sender = sender.clone();
            tokio::spawn(async move {
                let _ = sender.send(event).await;
            });
        }
    }
}

/// Runs imports against a repository host and a graph store
pub struct Pipeline {
    fetcher: TreeFetcher,
    store: Arc<dyn GraphStore>,
    limiter: Arc<ConcurrencyLimiter>,
    config: PipelineConfig,
    transform: TransformSettings,
    /// Serializes the quota check and the save for each caller
    save_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Pipeline {
    pub fn new(
        fetcher: TreeFetcher,
        store: Arc<dyn GraphStore>,
        limiter: Arc<ConcurrencyLimiter>,
        config: PipelineConfig,
        transform: TransformSettings,
    ) -> Self {
        Self {
            fetcher,
            store,
            limiter,
            config,
            transform,
            save_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    /// Import one repository for `caller_id`
    ///
    /// On failure nothing is stored and `progress` receives a single error
    /// event carrying the same message as the returned error.
    pub async fn run(
        &self,
        repo_identifier: &str,
        caller_id: &str,
        progress: &ProgressReporter,
    ) -> Result<Graph> {
        match self.run_guarded(repo_identifier, caller_id, progress).await {
            Ok(graph) => {
                info!(
                    "Imported {} for {}: {} files, {} edges, health {}",
                    graph.name, caller_id, graph.file_count, graph.edge_count, graph.health_score
                );
                progress.complete(graph.summary());
                Ok(graph)
            }
            Err(e) => {
                error!(
                    "Import of {} for {} failed ({:?}, retryable: {}): {}",
                    repo_identifier,
                    caller_id,
                    e.kind(),
                    e.is_retryable(),
                    e
                );
                progress.error(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_guarded(
        &self,
        repo_identifier: &str,
        caller_id: &str,
        progress: &ProgressReporter,
    ) -> Result<Graph> {
        let _slot = self.limiter.try_acquire(caller_id)?;

        let limit = Duration::from_secs(self.config.timeout_secs);
        match tokio::time::timeout(limit, self.import(repo_identifier, caller_id, progress)).await {
            Ok(result) => result,
            Err(_) => Err(RepographError::Timeout {
                seconds: self.config.timeout_secs,
            }),
        }
    }

    async fn import(
        &self,
        repo_identifier: &str,
        caller_id: &str,
        progress: &ProgressReporter,
    ) -> Result<Graph> {
        let repo_ref = parse_repo_url(repo_identifier)?;
        progress.progress(Stage::Fetching, 5, format!("Parsing repository {}...", repo_ref));

        let fetched = self
            .fetcher
            .fetch(&repo_ref.owner, &repo_ref.repo, |stage, detail| {
                let percent = if stage == Stage::Parsing { 30 } else { 15 };
                progress.progress(stage, percent, detail);
            })
            .await?;
        info!(
            "Fetched {} of {} tree entries from {} ({} branch)",
            fetched.entries.len(),
            fetched.raw_count,
            repo_ref,
            fetched.default_branch
        );

        let mut warnings = Vec::new();
        if fetched.truncated {
            warn!("Graph for {} covers a truncated file tree", repo_ref);
            warnings.push(
                "Repository is very large and the file tree was truncated; the graph is partial."
                    .to_string(),
            );
        }

        if fetched.entries.len() > self.config.max_files {
            return Err(RepographError::FileLimit {
                found: fetched.entries.len(),
                limit: self.config.max_files,
            });
        }

        progress.progress(
            Stage::Computing,
            40,
            format!("Processing {} files...", fetched.entries.len()),
        );

        let transformed = transform_entries(&fetched.entries, &self.transform, |stage, local| {
            // The terminal stage belongs to the pipeline, not the transform
            let stage = if stage == Stage::Done { Stage::Layouting } else { stage };
            let mapped = (40.0 + f64::from(local) / 2.0).round() as u8;
            progress.progress(stage, mapped, format!("{}...", stage));
        });

        progress.progress(Stage::Saving, 92, "Saving graph...");

        let save_lock = self.save_lock(caller_id);
        let _held = save_lock.lock().await;

        let owned = self.store.count_for(caller_id).await?;
        if owned >= self.config.max_graphs_per_caller {
            return Err(RepographError::QuotaExceeded {
                limit: self.config.max_graphs_per_caller,
            });
        }

        let graph = self.assemble(repo_ref, caller_id, fetched, transformed, warnings);
        self.store.save(&graph).await?;

        progress.progress(Stage::Done, 100, "Complete!");
        Ok(graph)
    }

    fn save_lock(&self, caller_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.save_locks.lock().entry(caller_id.to_string()).or_default())
    }

    fn assemble(
        &self,
        repo_ref: RepoRef,
        caller_id: &str,
        fetched: FetchResult,
        transformed: TransformResult,
        warnings: Vec<String>,
    ) -> Graph {
        let metadata = fetched.metadata;
        let now = Utc::now();
        Graph {
            id: Uuid::new_v4().to_string(),
            caller_id: caller_id.to_string(),
            name: repo_ref.to_string(),
            repo_url: repo_ref.url(),
            repo_owner: repo_ref.owner,
            repo_name: metadata.name,
            default_branch: fetched.default_branch,
            star_count: metadata.star_count,
            language: metadata.language,
            nodes: transformed.nodes,
            edges: transformed.edges,
            file_count: transformed.file_count,
            edge_count: transformed.edge_count,
            health_score: transformed.health_score,
            warnings,
            created_at: now,
            last_viewed_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fetcher::{EntryKind, PathFilter, RawTree, RepositoryHost, TreeEntry};
    use crate::core::model::RepoMetadata;
    use crate::core::store::MemoryStore;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Host serving a fixed tree, optionally parked until released
    struct FakeHost {
        paths: Vec<String>,
        truncated: bool,
        gate: Option<Arc<Notify>>,
        hang: bool,
    }

    impl FakeHost {
        fn with_paths(paths: &[&str]) -> Self {
            Self {
                paths: paths.iter().map(|p| p.to_string()).collect(),
                truncated: false,
                gate: None,
                hang: false,
            }
        }
    }

    #[async_trait]
    impl RepositoryHost for FakeHost {
        async fn repo_metadata(&self, owner: &str, repo: &str) -> Result<RepoMetadata> {
            if repo == "missing" {
                return Err(RepographError::NotFound {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                });
            }
            if self.hang {
                std::future::pending::<()>().await;
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(RepoMetadata {
                name: repo.to_string(),
                default_branch: "main".to_string(),
                star_count: 1,
                language: Some("TypeScript".to_string()),
                html_url: None,
            })
        }

        async fn tree(&self, _owner: &str, _repo: &str, _branch: &str) -> Result<RawTree> {
            Ok(RawTree {
                tree: self
                    .paths
                    .iter()
                    .map(|p| TreeEntry {
                        path: p.clone(),
                        kind: EntryKind::Blob,
                        size: Some(400),
                    })
                    .collect(),
                truncated: self.truncated,
            })
        }

        fn host_name(&self) -> &str {
            "fake"
        }
    }

    fn pipeline_with(host: FakeHost, config: PipelineConfig) -> (Pipeline, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let limiter = Arc::new(ConcurrencyLimiter::new(config.max_concurrent_per_caller));
        let pipeline = Pipeline::new(
            TreeFetcher::new(Arc::new(host), PathFilter::default()),
            store.clone(),
            limiter,
            config,
            TransformSettings::default(),
        );
        (pipeline, store)
    }

    fn drain(rx: &mut mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    const WEB_APP: &[&str] = &["src/index.ts", "src/App.tsx", "src/App.test.tsx", "package.json"];

    #[test]
    fn test_limiter_counts_and_releases() {
        let limiter = Arc::new(ConcurrencyLimiter::new(2));
        let a = limiter.try_acquire("alice").unwrap();
        let b = limiter.try_acquire("alice").unwrap();
        assert_eq!(limiter.active("alice"), 2);
        assert!(matches!(
            limiter.try_acquire("alice"),
            Err(RepographError::ConcurrencyLimit { limit: 2 })
        ));
        assert!(limiter.try_acquire("bob").is_ok());

        drop(a);
        assert_eq!(limiter.active("alice"), 1);
        drop(b);
        assert_eq!(limiter.active("alice"), 0);
        assert!(limiter.try_acquire("alice").is_ok());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_non_blocking() {
        let (reporter, mut rx) = ProgressReporter::channel(2);
        reporter.progress(Stage::Fetching, 30, "a");
        reporter.progress(Stage::Fetching, 15, "b");
        reporter.progress(Stage::Parsing, 40, "dropped, channel full");

        let events = drain(&mut rx);
        let values: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![30, 30]);

        ProgressReporter::disabled().progress(Stage::Done, 100, "nobody listening");
    }

    #[tokio::test]
    async fn test_successful_import() {
        let (pipeline, store) = pipeline_with(FakeHost::with_paths(WEB_APP), PipelineConfig::default());
        let (reporter, mut rx) = ProgressReporter::channel(64);

        let graph = pipeline
            .run("https://github.com/acme/widgets.git", "alice", &reporter)
            .await
            .unwrap();

        assert_eq!(graph.name, "acme/widgets");
        assert_eq!(graph.repo_url, "https://github.com/acme/widgets");
        assert_eq!(graph.file_count, 4);
        assert_eq!(graph.edge_count, 3);
        assert!(graph.warnings.is_empty());
        assert_eq!(store.count_for("alice").await.unwrap(), 1);
        assert_eq!(pipeline.limiter().active("alice"), 0);

        let events = drain(&mut rx);
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.first(), Some(&5));
        assert_eq!(
            percents[percents.len() - 10..],
            [40, 45, 55, 65, 75, 83, 88, 90, 92, 100]
        );

        let terminal: Vec<&ProgressEvent> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminal.len(), 1);
        assert!(matches!(terminal[0], ProgressEvent::Complete { graph: g } if g.id == graph.id));
        assert!(events.last().map(ProgressEvent::is_terminal).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_truncated_tree_adds_warning() {
        let mut host = FakeHost::with_paths(WEB_APP);
        host.truncated = true;
        let (pipeline, _) = pipeline_with(host, PipelineConfig::default());

        let graph = pipeline
            .run("acme/widgets", "alice", &ProgressReporter::disabled())
            .await
            .unwrap();
        assert_eq!(graph.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_emit_one_error_event() {
        let (pipeline, store) = pipeline_with(FakeHost::with_paths(WEB_APP), PipelineConfig::default());

        for (input, expect_invalid) in [("not a repo", true), ("acme/missing", false)] {
            let (reporter, mut rx) = ProgressReporter::channel(64);
            let err = pipeline.run(input, "alice", &reporter).await.unwrap_err();
            assert_eq!(matches!(err, RepographError::InvalidInput(_)), expect_invalid);

            let events = drain(&mut rx);
            let errors: Vec<&ProgressEvent> = events.iter().filter(|e| e.is_terminal()).collect();
            assert_eq!(errors.len(), 1);
            assert!(matches!(errors[0], ProgressEvent::Error { message } if *message == err.to_string()));
        }

        assert_eq!(store.count_for("alice").await.unwrap(), 0);
        assert_eq!(pipeline.limiter().active("alice"), 0);
    }

    #[tokio::test]
    async fn test_file_limit() {
        let config = PipelineConfig {
            max_files: 3,
            ..PipelineConfig::default()
        };
        let (pipeline, store) = pipeline_with(FakeHost::with_paths(WEB_APP), config);

        let err = pipeline
            .run("acme/widgets", "alice", &ProgressReporter::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, RepographError::FileLimit { found: 4, limit: 3 }));
        assert_eq!(store.count_for("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_quota_rejects_extra_graph() {
        let config = PipelineConfig {
            max_graphs_per_caller: 2,
            ..PipelineConfig::default()
        };
        let (pipeline, store) = pipeline_with(FakeHost::with_paths(WEB_APP), config);
        let reporter = ProgressReporter::disabled();

        pipeline.run("acme/one", "alice", &reporter).await.unwrap();
        pipeline.run("acme/two", "alice", &reporter).await.unwrap();
        let err = pipeline.run("acme/three", "alice", &reporter).await.unwrap_err();

        assert!(matches!(err, RepographError::QuotaExceeded { limit: 2 }));
        assert_eq!(store.count_for("alice").await.unwrap(), 2);
        assert!(pipeline.run("acme/three", "bob", &reporter).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrency_limit_applies_per_caller() {
        let gate = Arc::new(Notify::new());
        let host = FakeHost {
            gate: Some(gate.clone()),
            ..FakeHost::with_paths(WEB_APP)
        };
        let (pipeline, _) = pipeline_with(host, PipelineConfig::default());
        let pipeline = Arc::new(pipeline);

        let mut running = Vec::new();
        for name in ["one", "two"] {
            let p = pipeline.clone();
            running.push(tokio::spawn(async move {
                p.run(&format!("acme/{}", name), "alice", &ProgressReporter::disabled()).await
            }));
        }

        while pipeline.limiter().active("alice") < 2 {
            tokio::task::yield_now().await;
        }

        let err = pipeline
            .run("acme/three", "alice", &ProgressReporter::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, RepographError::ConcurrencyLimit { limit: 2 }));

        gate.notify_waiters();
        for handle in running {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(pipeline.limiter().active("alice"), 0);
    }

    #[tokio::test]
    async fn test_timeout_releases_slot() {
        let host = FakeHost {
            hang: true,
            ..FakeHost::with_paths(WEB_APP)
        };
        let config = PipelineConfig {
            timeout_secs: 1,
            ..PipelineConfig::default()
        };
        let (pipeline, store) = pipeline_with(host, config);
        let (reporter, mut rx) = ProgressReporter::channel(64);

        let err = pipeline.run("acme/widgets", "alice", &reporter).await.unwrap_err();
        assert!(matches!(err, RepographError::Timeout { seconds: 1 }));
        assert_eq!(pipeline.limiter().active("alice"), 0);
        assert_eq!(store.count_for("alice").await.unwrap(), 0);

        let events = drain(&mut rx);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_deleting_a_graph_frees_quota() {
        let config = PipelineConfig {
            max_graphs_per_caller: 1,
            ..PipelineConfig::default()
        };
        let (pipeline, store) = pipeline_with(FakeHost::with_paths(WEB_APP), config);
        let reporter = ProgressReporter::disabled();

        let first = pipeline.run("acme/one", "alice", &reporter).await.unwrap();
        assert!(matches!(
            pipeline.run("acme/two", "alice", &reporter).await,
            Err(RepographError::QuotaExceeded { limit: 1 })
        ));

        store.delete(&first.id).await.unwrap();
        let second = pipeline.run("acme/two", "alice", &reporter).await.unwrap();
        assert_eq!(second.name, "acme/two");
        assert_eq!(store.count_for("alice").await.unwrap(), 1);
    }

    /// Memory store that yields between reading the count and returning it
    #[derive(Default)]
    struct YieldingStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl GraphStore for YieldingStore {
        async fn save(&self, graph: &Graph) -> Result<()> {
            tokio::task::yield_now().await;
            self.inner.save(graph).await
        }

        async fn load(&self, id: &str) -> Result<Graph> {
            self.inner.load(id).await
        }

        async fn count_for(&self, caller_id: &str) -> Result<usize> {
            let count = self.inner.count_for(caller_id).await?;
            tokio::task::yield_now().await;
            Ok(count)
        }

        async fn list_for(&self, caller_id: &str) -> Result<Vec<GraphSummary>> {
            self.inner.list_for(caller_id).await
        }

        async fn touch(&self, id: &str) -> Result<Graph> {
            self.inner.touch(id).await
        }

        async fn rename(&self, id: &str, name: &str) -> Result<Graph> {
            self.inner.rename(id, name).await
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_imports_respect_quota() {
        let config = PipelineConfig {
            max_graphs_per_caller: 1,
            ..PipelineConfig::default()
        };
        let store = Arc::new(YieldingStore::default());
        let pipeline = Arc::new(Pipeline::new(
            TreeFetcher::new(Arc::new(FakeHost::with_paths(WEB_APP)), PathFilter::default()),
            store.clone(),
            Arc::new(ConcurrencyLimiter::new(config.max_concurrent_per_caller)),
            config,
            TransformSettings::default(),
        ));

        let runs: Vec<_> = ["one", "two"]
            .into_iter()
            .map(|name| {
                let p = pipeline.clone();
                tokio::spawn(async move {
                    p.run(&format!("acme/{}", name), "alice", &ProgressReporter::disabled()).await
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in runs {
            outcomes.push(handle.await.unwrap());
        }

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(RepographError::QuotaExceeded { limit: 1 }))));
        assert_eq!(store.count_for("alice").await.unwrap(), 1);
    }
}
