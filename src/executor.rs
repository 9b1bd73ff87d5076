//! Fixed-size worker pool draining the task queue.
//!
//! Each worker loops: pop a task, fetch or locate its content, resolve the
//! file type, dispatch to the extractor registry on a blocking thread, store
//! any result, mark the task done. Per-task failures, panics included,
//! become a [`TaskOutcome`] and never leave the worker.

use futures::FutureExt;
use std::any::Any;
use std::ops::AddAssign;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::file_types;
use crate::harvest::pipeline::StagingDir;
use crate::harvest::registry::{DispatchError, ExtractorRegistry};
use crate::identity::IdentityPool;
use crate::model::{Task, TaskSource};
use crate::queue::TaskQueue;
use crate::store::ItemStore;
use crate::traits::{FetchError, Transport};

/// What happened to one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// An extractor applied and its result was stored.
    Stored,
    /// Extractors were registered for the type but none returned a result.
    NoResult,
    /// No file type could be determined, or none is registered.
    NoExtractor(Option<String>),
    FetchFailed(String),
    ParseFailed(String),
    /// Processing panicked; the worker survives and moves on.
    Panicked(String),
}

/// Per-worker counters, returned when the worker stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: usize,
    pub stored: usize,
    pub no_result: usize,
    pub no_extractor: usize,
    pub fetch_failed: usize,
    pub parse_failed: usize,
    pub panicked: usize,
}

impl WorkerStats {
    pub fn record(&mut self, outcome: &TaskOutcome) {
        self.processed += 1;
        match outcome {
            TaskOutcome::Stored => self.stored += 1,
            TaskOutcome::NoResult => self.no_result += 1,
            TaskOutcome::NoExtractor(_) => self.no_extractor += 1,
            TaskOutcome::FetchFailed(_) => self.fetch_failed += 1,
            TaskOutcome::ParseFailed(_) => self.parse_failed += 1,
            TaskOutcome::Panicked(_) => self.panicked += 1,
        }
    }
}

impl AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.stored += other.stored;
        self.no_result += other.no_result;
        self.no_extractor += other.no_extractor;
        self.fetch_failed += other.fetch_failed;
        self.parse_failed += other.parse_failed;
        self.panicked += other.panicked;
    }
}

/// Read-only collaborators shared by every worker of a run.
pub struct WorkerContext {
    pub registry: Arc<ExtractorRegistry>,
    pub transport: Arc<dyn Transport>,
    pub identities: Arc<IdentityPool>,
    pub fetch_timeout: Duration,
    /// Where downloads are written; `None` when the run has no URL tasks.
    pub staging: Option<Arc<StagingDir>>,
}

/// Marks its task done when dropped, including on panic.
struct DoneGuard<'a> {
    queue: &'a TaskQueue,
    task: &'a Task,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.queue.mark_done(self.task);
    }
}

pub struct Worker {
    id: usize,
    queue: Arc<TaskQueue>,
    store: Arc<ItemStore>,
    stop: CancellationToken,
    ctx: Arc<WorkerContext>,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<TaskQueue>,
        store: Arc<ItemStore>,
        stop: CancellationToken,
        ctx: Arc<WorkerContext>,
    ) -> Self {
        Self {
            id,
            queue,
            store,
            stop,
            ctx,
        }
    }

    /// Processes tasks until stop is requested and the queue is empty.
    pub async fn run(self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        debug!(worker = self.id, "Worker started");

        while let Some(task) = self.queue.pop(&self.stop).await {
            let _done = DoneGuard {
                queue: &self.queue,
                task: &task,
            };
            let outcome = AssertUnwindSafe(self.process(&task))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    let message = panic_message(&*payload);
                    error!(worker = self.id, task_id = task.id, panic = %message, "Task panicked");
                    TaskOutcome::Panicked(message)
                });
            stats.record(&outcome);
        }

        debug!(worker = self.id, processed = stats.processed, "Worker stopped");
        stats
    }

    /// Runs one task through fetch, type resolution and dispatch.
    #[instrument(skip(self, task), fields(worker = self.id, task_id = task.id))]
    pub async fn process(&self, task: &Task) -> TaskOutcome {
        let path = match self.acquire(task).await {
            Ok(path) => path,
            Err(e) => {
                warn!(source = %task.source.display(), error = %e, "Fetch failed");
                return TaskOutcome::FetchFailed(e.to_string());
            }
        };

        let file_type = task
            .file_type
            .as_deref()
            .map(file_types::normalize)
            .or_else(|| match &task.source {
                TaskSource::Url(url) => file_types::from_url(url),
                TaskSource::Path(path) => file_types::from_path(path),
            });
        let Some(file_type) = file_type else {
            debug!(path = %path.display(), "Cannot determine file type");
            return TaskOutcome::NoExtractor(None);
        };
        if !self.ctx.registry.supports(&file_type) {
            debug!(path = %path.display(), %file_type, "No extractor for file type");
            return TaskOutcome::NoExtractor(Some(file_type));
        }

        let registry = self.ctx.registry.clone();
        let parse_path = path.clone();
        let dispatched =
            tokio::task::spawn_blocking(move || registry.dispatch(&parse_path, &file_type)).await;

        match dispatched {
            Ok(Ok(Some(result))) => {
                debug!(
                    path = %path.display(),
                    users = result.users.len(),
                    emails = result.emails.len(),
                    hosts = result.hosts.len(),
                    "Metadata extracted"
                );
                self.store.push(result);
                TaskOutcome::Stored
            }
            Ok(Ok(None)) => TaskOutcome::NoResult,
            Ok(Err(DispatchError::NoExtractor(t))) => TaskOutcome::NoExtractor(Some(t)),
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "Extraction failed");
                TaskOutcome::ParseFailed(e.to_string())
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Extraction task join error");
                TaskOutcome::ParseFailed(format!("Task join error: {}", e))
            }
        }
    }

    /// Returns a local path holding the task's content.
    async fn acquire(&self, task: &Task) -> Result<PathBuf, FetchError> {
        match &task.source {
            TaskSource::Path(path) => {
                let meta = tokio::fs::metadata(path).await?;
                if !meta.is_file() {
                    return Err(FetchError::NotAFile(path.display().to_string()));
                }
                Ok(path.clone())
            }
            TaskSource::Url(url) => {
                let staging = self
                    .ctx
                    .staging
                    .as_ref()
                    .ok_or_else(|| FetchError::Request {
                        url: url.clone(),
                        reason: "no staging directory for downloads".to_string(),
                    })?;
                let identity = self.ctx.identities.choose();
                let limit = self.ctx.fetch_timeout;

                let bytes = timeout(limit, self.ctx.transport.fetch(url, limit, identity))
                    .await
                    .map_err(|_| FetchError::Timeout {
                        url: url.clone(),
                        timeout_secs: limit.as_secs(),
                    })??;

                staging
                    .store(task.id, url, &bytes)
                    .map_err(|e| FetchError::Request {
                        url: url.clone(),
                        reason: e.to_string(),
                    })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A fixed set of workers sharing one queue, store and stop token.
pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerPool {
    /// Spawns `size` workers on the current runtime.
    pub fn spawn(
        size: usize,
        queue: Arc<TaskQueue>,
        store: Arc<ItemStore>,
        stop: CancellationToken,
        ctx: Arc<WorkerContext>,
    ) -> Self {
        let handles = (0..size)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    queue.clone(),
                    store.clone(),
                    stop.clone(),
                    ctx.clone(),
                );
                tokio::spawn(worker.run())
            })
            .collect();
        info!(workers = size, "Worker pool started");
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Waits for every worker to stop and sums their counters.
    ///
    /// Only returns once the stop token has been cancelled.
    pub async fn join(self) -> WorkerStats {
        let mut total = WorkerStats::default();
        for handle in self.handles {
            match handle.await {
                Ok(stats) => total += stats,
                Err(e) => error!(error = %e, "Worker terminated abnormally"),
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::formats::pdf::testing::pdf_with_info;
    use crate::model::ExtractionResult;
    use crate::traits::{ExtractionError, MetadataExtractor};
    use async_trait::async_trait;
    use std::path::Path;

    struct StaticTransport;

    #[async_trait]
    impl Transport for StaticTransport {
        async fn fetch(
            &self,
            url: &str,
            _timeout: Duration,
            _identity: &str,
        ) -> Result<Vec<u8>, FetchError> {
            if url.contains("missing") {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                });
            }
            if url.contains("slow") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if url.contains("boom") {
                panic!("transport exploded on {url}");
            }
            Ok(pdf_with_info(&[("Author", "Carol")]))
        }
    }

    /// Handles "txt": declines empty files, fails on "bad", else reports the content as a user.
    struct TextExtractor;

    impl MetadataExtractor for TextExtractor {
        fn name(&self) -> &'static str {
            "text"
        }

        fn handled_types(&self) -> &'static [&'static str] {
            &["txt"]
        }

        fn parse_data(
            &self,
            path: &Path,
            file_type: &str,
        ) -> Result<Option<ExtractionResult>, ExtractionError> {
            if !self.handles(file_type) {
                return Ok(None);
            }
            let content = std::fs::read_to_string(path)?;
            match content.trim() {
                "" => Ok(None),
                "bad" => Err(ExtractionError::InvalidContent("bad".into())),
                user => Ok(Some(ExtractionResult {
                    users: vec![user.to_string()],
                    ..Default::default()
                })),
            }
        }
    }

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "test_worker_{}_{}_{}",
            label,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn worker(staging: Option<Arc<StagingDir>>) -> (Worker, Arc<TaskQueue>, Arc<ItemStore>) {
        let mut registry = ExtractorRegistry::with_defaults();
        registry.register(Arc::new(TextExtractor));
        let ctx = Arc::new(WorkerContext {
            registry: Arc::new(registry),
            transport: Arc::new(StaticTransport),
            identities: Arc::new(IdentityPool::default()),
            fetch_timeout: Duration::from_millis(200),
            staging,
        });
        let queue = Arc::new(TaskQueue::new());
        let store = Arc::new(ItemStore::new());
        let worker = Worker::new(0, queue.clone(), store.clone(), CancellationToken::new(), ctx);
        (worker, queue, store)
    }

    #[tokio::test]
    async fn test_outcomes_are_distinguished() {
        let dir = temp_dir("outcomes");
        let write = |name: &str, content: &str| {
            let path = dir.join(name);
            std::fs::write(&path, content).unwrap();
            path
        };
        let (worker, _, store) = worker(None);

        let stored = Task::path(write("alice.txt", "alice"));
        let declined = Task::path(write("empty.txt", ""));
        let broken = Task::path(write("broken.txt", "bad"));
        let unknown = Task::path(write("notes.xyz", "?"));
        let no_ext = Task::path(write("README", "?"));
        let missing = Task::path(dir.join("gone.txt"));
        let subdir = Task::path(dir.clone());

        assert_eq!(worker.process(&stored).await, TaskOutcome::Stored);
        assert_eq!(worker.process(&declined).await, TaskOutcome::NoResult);
        assert!(matches!(worker.process(&broken).await, TaskOutcome::ParseFailed(_)));
        assert_eq!(
            worker.process(&unknown).await,
            TaskOutcome::NoExtractor(Some("xyz".into()))
        );
        assert_eq!(worker.process(&no_ext).await, TaskOutcome::NoExtractor(None));
        assert!(matches!(worker.process(&missing).await, TaskOutcome::FetchFailed(_)));
        assert!(matches!(worker.process(&subdir).await, TaskOutcome::FetchFailed(_)));

        assert_eq!(store.len(), 1);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_url_task_is_downloaded_and_parsed() {
        let staging = Arc::new(StagingDir::temporary().unwrap());
        let (worker, _, store) = worker(Some(staging));

        let task = Task::url("https://example.com/docs/a.pdf", Some("pdf".into()));
        assert_eq!(worker.process(&task).await, TaskOutcome::Stored);
        assert_eq!(store.items()[0].users, vec!["Carol"]);

        let failing = Task::url("https://example.com/missing.pdf", Some("pdf".into()));
        assert!(matches!(worker.process(&failing).await, TaskOutcome::FetchFailed(_)));
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_fetch_failure() {
        let staging = Arc::new(StagingDir::temporary().unwrap());
        let (worker, _, store) = worker(Some(staging));

        let task = Task::url("https://example.com/slow.pdf", Some("pdf".into()));
        let outcome = worker.process(&task).await;
        assert!(matches!(outcome, TaskOutcome::FetchFailed(ref m) if m.contains("timed out")));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_url_task_without_staging_fails() {
        let (worker, _, _) = worker(None);
        let task = Task::url("https://example.com/a.pdf", None);
        assert!(matches!(worker.process(&task).await, TaskOutcome::FetchFailed(_)));
    }

    #[tokio::test]
    async fn test_run_marks_every_task_done_and_stops() {
        let dir = temp_dir("run");
        let (worker, queue, store) = worker(None);
        let stop = worker.stop.clone();

        for i in 0..5 {
            let path = dir.join(format!("u{i}.txt"));
            std::fs::write(&path, format!("user{i}")).unwrap();
            queue.push(Task::path(path));
        }
        queue.push(Task::path(dir.join("absent.txt")));

        let handle = tokio::spawn(worker.run());
        queue.drain().await;
        stop.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(stats.processed, 6);
        assert_eq!(stats.stored, 5);
        assert_eq!(stats.fetch_failed, 1);
        assert_eq!(store.len(), 5);
        assert_eq!(queue.outstanding(), 0);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_task_does_not_shrink_the_pool() {
        let staging = Arc::new(StagingDir::temporary().unwrap());
        let (worker, queue, store) = worker(Some(staging));
        let stop = worker.stop.clone();
        let pool = WorkerPool::spawn(2, queue.clone(), store.clone(), stop.clone(), worker.ctx.clone());

        for name in ["a", "boom1", "b", "boom2", "c"] {
            queue.push(Task::url(
                format!("https://example.com/{name}.pdf"),
                Some("pdf".into()),
            ));
        }

        let drained = tokio::time::timeout(Duration::from_secs(5), queue.drain()).await;
        assert!(drained.is_ok(), "tasks stranded after a panic");
        stop.cancel();
        let stats = pool.join().await;

        assert_eq!(stats.processed, 5);
        assert_eq!(stats.panicked, 2);
        assert_eq!(stats.stored, 3);
        assert_eq!(store.len(), 3);
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn test_panic_message_from_payload() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(&*payload), "static message");
        let payload: Box<dyn Any + Send> = Box::new(format!("owned {}", 1));
        assert_eq!(panic_message(&*payload), "owned 1");
    }

    #[test]
    fn test_stats_accumulate() {
        let mut a = WorkerStats::default();
        a.record(&TaskOutcome::Stored);
        a.record(&TaskOutcome::FetchFailed("x".into()));
        let mut b = WorkerStats::default();
        b.record(&TaskOutcome::NoResult);
        a += b;

        assert_eq!(a.processed, 3);
        assert_eq!(a.stored, 1);
        assert_eq!(a.fetch_failed, 1);
        assert_eq!(a.no_result, 1);
    }
}
