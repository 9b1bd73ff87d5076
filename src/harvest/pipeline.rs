//! Harvest orchestrator.
//!
//! This module provides the [`Harvester`] coordinator that drives a run:
//! - Remote mode: one search + download phase per requested file type
//! - Local mode: one phase over the entries of a directory
//! - Stealth mode: list discovered items without fetching them
//! - A drain barrier between phases, then stop, join and aggregate
//!
//! Downloads are staged in a [`StagingDir`], removed on drop unless the user
//! asked to keep them.

use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::executor::{WorkerContext, WorkerPool, WorkerStats};
use crate::harvest::config::{ConfigError, HarvestConfig};
use crate::harvest::registry::ExtractorRegistry;
use crate::harvest::report::HarvestReport;
use crate::identity::IdentityPool;
use crate::model::{ExtractionResult, Task};
use crate::queue::TaskQueue;
use crate::remote::{HttpTransport, WebSearch};
use crate::store::ItemStore;
use crate::traits::{SearchProvider, Transport};

// ============================================================================
// Staging
// ============================================================================

/// Errors from writing downloads to the staging directory.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// A file name derived from a URL would escape the staging root
    #[error("Path traversal attempt rejected: '{attempted}'")]
    PathTraversal { attempted: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Directory downloaded documents are written to before parsing.
///
/// # RAII Cleanup
///
/// A temporary staging directory is removed on [`Drop`], so downloads never
/// outlive the run. A persistent one (the user's output directory) is kept.
#[derive(Debug)]
pub struct StagingDir {
    pub path: PathBuf,
    pub(crate) cleanup_on_drop: bool,
}

impl StagingDir {
    /// Creates a fresh per-run directory under the system temp dir.
    pub fn temporary() -> std::io::Result<Self> {
        let path = std::env::temp_dir().join(format!(
            "metaharvest_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            path,
            cleanup_on_drop: true,
        })
    }

    /// Uses `path` (created if needed) and keeps its contents.
    pub fn persistent(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            path,
            cleanup_on_drop: false,
        })
    }

    /// Resolves `relative` against the staging root, rejecting any path that
    /// escapes it.
    pub fn safe_child(&self, relative: &Path) -> Result<PathBuf, PipelineError> {
        for component in relative.components() {
            match component {
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(PipelineError::PathTraversal {
                        attempted: relative.display().to_string(),
                    });
                }
                _ => {}
            }
        }
        Ok(self.path.join(relative))
    }

    /// Writes downloaded `bytes` for task `task_id` and returns the file path.
    ///
    /// The file name is `<task_id>_<last URL segment>`, reduced to a safe
    /// character set so one task can never overwrite another's download.
    pub fn store(&self, task_id: u64, url: &str, bytes: &[u8]) -> Result<PathBuf, PipelineError> {
        let path = self.safe_child(Path::new(&Self::file_name_for(task_id, url)))?;
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn file_name_for(task_id: u64, url: &str) -> String {
        let segment = url::Url::parse(url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut s| s.next_back())
                    .map(str::to_string)
            })
            .unwrap_or_default();
        let cleaned: String = segment
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let cleaned = cleaned.trim_start_matches('.');
        if cleaned.is_empty() {
            format!("{task_id}_download")
        } else {
            format!("{task_id}_{cleaned}")
        }
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.cleanup_on_drop && self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to remove staging directory");
            }
        }
    }
}

// ============================================================================
// Run results
// ============================================================================

/// Statistics about a harvest run.
#[derive(Debug, Default, Clone)]
pub struct HarvestStats {
    /// Total time spent on the run (milliseconds)
    pub total_duration_ms: u64,

    /// Phases executed (one per file type in remote mode, one in local mode)
    pub phases: usize,

    /// Items returned by search or directory listing, after truncation
    pub discovered: usize,

    /// Tasks pushed to the queue
    pub enqueued: usize,

    /// Size of the worker pool (zero in stealth mode)
    pub workers: usize,

    /// Per-task outcome counters summed over all workers
    pub tasks: WorkerStats,
}

/// Everything a finished run produced.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub report: HarvestReport,
    pub stats: HarvestStats,
    /// Items listed instead of processed in stealth mode.
    pub listed: Vec<String>,
    /// Raw per-task results, in store order.
    pub items: Vec<ExtractionResult>,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    report: &'a HarvestReport,
    listed: &'a [String],
}

impl RunSummary {
    /// Text output: listed items (stealth mode) followed by the report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for item in &self.listed {
            out.push_str(&format!("  * {item}\n"));
        }
        out.push_str(&self.report.to_string());
        out
    }

    /// The report and the listed items as one JSON document.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&JsonOutput {
            report: &self.report,
            listed: &self.listed,
        })
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives one harvest run over a task queue and a fixed worker pool.
///
/// # Example
///
/// ```ignore
/// use metadata_harvester::harvest::{HarvestConfig, Harvester};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = HarvestConfig::remote("example.com", &["pdf", "jpg"]);
///     let summary = Harvester::with_defaults(config)?.run().await?;
///     println!("{}", summary.report);
///     Ok(())
/// }
/// ```
pub struct Harvester {
    config: HarvestConfig,
    registry: Arc<ExtractorRegistry>,
    search: Arc<dyn SearchProvider>,
    transport: Arc<dyn Transport>,
    identities: Arc<IdentityPool>,
}

impl Harvester {
    /// Creates a harvester with the built-in extractors and the configured
    /// user agents.
    pub fn new(
        config: HarvestConfig,
        search: Arc<dyn SearchProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let registry = ExtractorRegistry::with_defaults().with_policy(config.dispatch_policy);
        let identities = config
            .user_agents_path()
            .map(|path| IdentityPool::from_file(&path))
            .unwrap_or_default();
        Self {
            config,
            registry: Arc::new(registry),
            search,
            transport,
            identities: Arc::new(identities),
        }
    }

    /// Creates a harvester backed by the HTTP transport and web search.
    pub fn with_defaults(config: HarvestConfig) -> Result<Self, ConfigError> {
        let search = WebSearch::new(config.search_delay())
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        let transport = HttpTransport::new().map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self::new(config, Arc::new(search), Arc::new(transport)))
    }

    /// Replaces the extractor registry.
    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_identities(mut self, identities: IdentityPool) -> Self {
        self.identities = Arc::new(identities);
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Executes the run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid, the local
    /// directory cannot be listed or the staging directory cannot be created.
    /// These are checked before any worker starts. Per-task failures are
    /// counted in [`HarvestStats::tasks`] and never returned.
    pub async fn run(&self) -> Result<RunSummary, ConfigError> {
        let start = Instant::now();
        self.config.validate()?;

        let mut summary = RunSummary::default();
        let local_entries = if self.config.local {
            info!("Starting local search...");
            Some(self.list_local()?)
        } else {
            info!("Starting remote search...");
            None
        };

        let queue = Arc::new(TaskQueue::new());
        let store = Arc::new(ItemStore::new());
        let stop = CancellationToken::new();

        let pool = if self.config.stealth {
            None
        } else {
            let staging = if self.config.local {
                None
            } else {
                Some(Arc::new(self.staging()?))
            };
            let ctx = Arc::new(WorkerContext {
                registry: self.registry.clone(),
                transport: self.transport.clone(),
                identities: self.identities.clone(),
                fetch_timeout: self.config.url_timeout(),
                staging,
            });
            Some(WorkerPool::spawn(
                self.config.workers,
                queue.clone(),
                store.clone(),
                stop.clone(),
                ctx,
            ))
        };
        summary.stats.workers = pool.as_ref().map_or(0, WorkerPool::size);

        match local_entries {
            Some(entries) => self.local_phase(entries, &queue, &mut summary).await,
            None => {
                for file_type in &self.config.file_types {
                    self.remote_phase(file_type, &queue, &mut summary).await;
                }
            }
        }

        stop.cancel();
        if let Some(pool) = pool {
            summary.stats.tasks = pool.join().await;
        }

        summary.items = store.items();
        if summary.items.is_empty() {
            warn!("No metadata found in files");
        }
        summary.report = HarvestReport::aggregate(&summary.items);
        summary.stats.total_duration_ms = start.elapsed().as_millis() as u64;

        info!(
            duration_ms = summary.stats.total_duration_ms,
            processed = summary.stats.tasks.processed,
            stored = summary.stats.tasks.stored,
            fetch_failed = summary.stats.tasks.fetch_failed,
            parse_failed = summary.stats.tasks.parse_failed,
            panicked = summary.stats.tasks.panicked,
            "Harvest completed"
        );
        Ok(summary)
    }

    fn staging(&self) -> Result<StagingDir, ConfigError> {
        match &self.config.out_directory {
            Some(dir) => StagingDir::persistent(dir),
            None => StagingDir::temporary(),
        }
        .map_err(|source| ConfigError::Staging {
            path: self.config.out_directory.clone().unwrap_or_default(),
            source,
        })
    }

    /// Immediate entries of the local directory, sorted by name.
    fn list_local(&self) -> Result<Vec<PathBuf>, ConfigError> {
        let dir = self
            .config
            .out_directory
            .as_ref()
            .ok_or(ConfigError::MissingDirectory)?;
        let invalid = |_| ConfigError::InvalidDirectory(dir.clone());
        let working_dir = dir.canonicalize().map_err(invalid)?;
        let mut entries = std::fs::read_dir(&working_dir)
            .map_err(invalid)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect::<Vec<_>>();
        entries.sort();
        Ok(entries)
    }

    async fn local_phase(&self, entries: Vec<PathBuf>, queue: &TaskQueue, summary: &mut RunSummary) {
        summary.stats.phases += 1;
        summary.stats.discovered += entries.len();

        if self.config.stealth {
            info!(
                directory = %self.config.out_directory.as_deref().unwrap_or(Path::new("")).display(),
                count = entries.len(),
                "List of files to analyze"
            );
            summary.listed.extend(entries.iter().map(|path| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            }));
            return;
        }

        info!(count = entries.len(), "Analyzing local files...");
        for path in entries {
            queue.push(Task::path(path));
            summary.stats.enqueued += 1;
        }
        debug!(pending = queue.pending(), "Waiting for the queue to drain");
        queue.drain().await;
        info!("Analyzing local files...DONE");
    }

    async fn remote_phase(&self, file_type: &str, queue: &TaskQueue, summary: &mut RunSummary) {
        summary.stats.phases += 1;
        let domain = self.config.domain.as_deref().unwrap_or_default();
        let query = format!("filetype:{file_type} site:{domain}");

        info!(%file_type, %domain, "Searching online for '{}' files in {}...", file_type, domain);
        let identity = self.identities.choose();
        let mut urls = match self
            .search
            .search(&query, self.config.search_max, identity)
            .await
        {
            Ok(urls) => urls,
            Err(e) => {
                error!(%file_type, error = %e, "Search failed, skipping file type");
                return;
            }
        };
        urls.truncate(self.config.search_max);
        summary.stats.discovered += urls.len();
        info!(%file_type, found = urls.len(), "Results: {} {} files found", urls.len(), file_type);

        if self.config.stealth {
            summary.listed.extend(urls);
            return;
        }

        urls.truncate(self.config.download_file_limit);
        info!(%file_type, count = urls.len(), "Downloading and analyzing files...");
        for url in urls {
            queue.push(Task::url(url, Some(file_type.to_string())));
            summary.stats.enqueued += 1;
        }
        debug!(pending = queue.pending(), "Waiting for the queue to drain");
        queue.drain().await;
        info!(%file_type, "Downloading and analyzing files...DONE");
    }
}

// ============================================================================
// Tests
// ============================================================================
