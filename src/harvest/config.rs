//! Harvest run configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::file_types;
use crate::harvest::registry::DispatchPolicy;

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_USER_AGENTS_FILE: &str = "user_agents.txt";

/// Errors that abort a run before any worker starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No directory specified for local mode")]
    MissingDirectory,

    #[error("Directory '{0}' does not exist or is not a directory")]
    InvalidDirectory(PathBuf),

    #[error("No target domain specified for remote mode")]
    MissingDomain,

    #[error("Worker count must be at least 1")]
    NoWorkers,

    #[error("Download timeout must be at least 1 second")]
    ZeroTimeout,

    #[error("Cannot prepare download directory '{path}': {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot build HTTP client: {0}")]
    Client(String),

    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Parameters of one harvest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Target domain for `site:` queries (remote mode).
    pub domain: Option<String>,

    /// One remote phase per type, in order.
    pub file_types: Vec<String>,

    /// Directory to analyze (local mode) or to keep downloads in (remote mode).
    pub out_directory: Option<PathBuf>,

    pub workers: usize,

    /// List discovered items without fetching or parsing them.
    pub stealth: bool,

    /// Max search results kept per file type.
    pub search_max: usize,

    /// Max items fetched and parsed per file type.
    pub download_file_limit: usize,

    pub url_timeout_secs: u64,

    /// Pause between search result pages.
    pub search_delay_secs: u64,

    pub local: bool,

    /// One user agent per line; defaults are used when absent.
    pub user_agents_file: Option<PathBuf>,

    pub dispatch_policy: DispatchPolicy,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            domain: None,
            file_types: Vec::new(),
            out_directory: None,
            workers: DEFAULT_WORKERS,
            stealth: false,
            search_max: 100,
            download_file_limit: 100,
            url_timeout_secs: 15,
            search_delay_secs: 30,
            local: false,
            user_agents_file: None,
            dispatch_policy: DispatchPolicy::FirstMatch,
        }
    }
}

impl HarvestConfig {
    /// Remote-mode configuration for `domain`.
    pub fn remote(domain: impl Into<String>, file_types: &[&str]) -> Self {
        Self {
            domain: Some(domain.into()),
            file_types: file_types.iter().map(|t| file_types::normalize(t)).collect(),
            ..Default::default()
        }
    }

    /// Local-mode configuration over `directory`.
    pub fn local(directory: impl Into<PathBuf>) -> Self {
        Self {
            out_directory: Some(directory.into()),
            local: true,
            ..Default::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.file_types = config
            .file_types
            .iter()
            .map(|t| file_types::normalize(t))
            .collect();
        Ok(config)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_stealth(mut self, stealth: bool) -> Self {
        self.stealth = stealth;
        self
    }

    pub fn with_limits(mut self, search_max: usize, download_file_limit: usize) -> Self {
        self.search_max = search_max;
        self.download_file_limit = download_file_limit;
        self
    }

    /// Sets the download timeout, rounding sub-second parts up to a whole second.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.url_timeout_secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self
    }

    pub fn with_out_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.out_directory = Some(directory.into());
        self
    }

    pub fn with_dispatch_policy(mut self, policy: DispatchPolicy) -> Self {
        self.dispatch_policy = policy;
        self
    }

    pub fn url_timeout(&self) -> Duration {
        Duration::from_secs(self.url_timeout_secs)
    }

    pub fn search_delay(&self) -> Duration {
        Duration::from_secs(self.search_delay_secs)
    }

    /// The user agents file to load, if any: the configured one, else
    /// `user_agents.txt` in the working directory when it exists.
    pub fn user_agents_path(&self) -> Option<PathBuf> {
        self.user_agents_file.clone().or_else(|| {
            let default = PathBuf::from(DEFAULT_USER_AGENTS_FILE);
            default.exists().then_some(default)
        })
    }

    /// Checks everything that must hold before workers are started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.url_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.local {
            let dir = self
                .out_directory
                .as_ref()
                .ok_or(ConfigError::MissingDirectory)?;
            if !dir.is_dir() {
                return Err(ConfigError::InvalidDirectory(dir.clone()));
            }
        } else if self.domain.as_deref().map_or(true, |d| d.trim().is_empty()) {
            return Err(ConfigError::MissingDomain);
        }
        Ok(())
    }
}
