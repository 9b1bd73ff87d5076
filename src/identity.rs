//! Client identity (user-agent) rotation.

use rand::seq::IndexedRandom;
use std::path::Path;
use tracing::{debug, warn};

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
    "Opera/9.80 (Windows NT 5.2; U; en) Presto/2.2.15 Version/10.00",
    "Mozilla/5.0 (Macintosh; U; Intel Mac OS X 10.5; pl; rv:1.9.1.5) Gecko/20091102 Firefox/3.5.5 FBSMTWB",
];

/// Candidate identity strings, one picked at random per request.
///
/// Never empty: falls back to [`DEFAULT_USER_AGENTS`].
#[derive(Debug, Clone)]
pub struct IdentityPool {
    identities: Vec<String>,
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self {
            identities: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl IdentityPool {
    pub fn new(identities: Vec<String>) -> Self {
        let identities: Vec<String> = identities
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if identities.is_empty() {
            Self::default()
        } else {
            Self { identities }
        }
    }

    /// Loads one identity per line; unreadable or empty files yield the defaults.
    pub fn from_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let pool = Self::new(content.lines().map(str::to_string).collect());
                debug!(path = %path.display(), count = pool.len(), "Loaded user agents");
                pool
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read user agents, using defaults");
                Self::default()
            }
        }
    }

    pub fn choose(&self) -> &str {
        self.identities
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENTS[0])
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
