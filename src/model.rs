use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a task's content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSource {
    Url(String),
    Path(PathBuf),
}

impl TaskSource {
    pub fn display(&self) -> String {
        match self {
            TaskSource::Url(url) => url.clone(),
            TaskSource::Path(path) => path.display().to_string(),
        }
    }
}

/// One unit of pipeline work. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Assigned by the queue on push; zero until then.
    pub id: u64,
    pub source: TaskSource,
    /// Declared file type (e.g., "pdf", "jpg"); inferred by the worker when absent.
    pub file_type: Option<String>,
}

impl Task {
    pub fn url(url: impl Into<String>, file_type: Option<String>) -> Self {
        Self {
            id: 0,
            source: TaskSource::Url(url.into()),
            file_type,
        }
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            id: 0,
            source: TaskSource::Path(path.into()),
            file_type: None,
        }
    }
}

/// Semi-structured extra metadata recorded by extractors.
///
/// Serializes externally tagged, e.g. `{"taken": "2019:05:04 10:00:00"}` or
/// `{"gps": {"latitude": -10.5, "longitude": 3.2}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiscRecord {
    Taken(String),
    Created(String),
    Gps {
        latitude: f64,
        longitude: f64,
    },
    Camera {
        vendor: Option<String>,
        model: Option<String>,
    },
    Software {
        creator: Option<String>,
        producer: Option<String>,
    },
}

/// Metadata extracted from a single task by one extractor plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// May contain duplicates; deduplicated at aggregation.
    pub users: Vec<String>,
    /// Deduplicated within one extractor invocation.
    pub emails: Vec<String>,
    pub hosts: Vec<String>,
    pub misc: Vec<MiscRecord>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.emails.is_empty()
            && self.hosts.is_empty()
            && self.misc.is_empty()
    }

    /// Appends `other` into `self`, keeping emails unique.
    pub fn merge(&mut self, other: ExtractionResult) {
        self.users.extend(other.users);
        self.hosts.extend(other.hosts);
        self.misc.extend(other.misc);
        for email in other.emails {
            if !self.emails.contains(&email) {
                self.emails.push(email);
            }
        }
    }
}
