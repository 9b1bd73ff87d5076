//! Free-text mining for email addresses and hostnames.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}")
        .expect("valid regex")
});

/// Host part of a URL, optionally preceded by userinfo.
static URL_HOST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:https?|ftps?|file|smb)://(?:[^\s/@]+@)?([a-z0-9](?:[a-z0-9\-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?)*)",
    )
    .expect("valid regex")
});

/// Server part of a UNC path such as `\\fileserver\share\doc.docx`.
static UNC_HOST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\\\([A-Za-z0-9][A-Za-z0-9.\-]*)\\")
        .expect("valid regex")
});

/// Stateless scanner over one piece of text.
///
/// Results keep first-seen order and never contain duplicates. Empty or
/// malformed input yields empty results.
#[derive(Debug, Clone, Copy)]
pub struct DataParser<'a> {
    text: &'a str,
}

impl<'a> DataParser<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }

    pub fn emails(&self) -> Vec<String> {
        unique(
            EMAIL_RE
                .find_iter(self.text)
                .map(|m| m.as_str().trim_end_matches('.').to_string()),
        )
    }

    /// Hostnames referenced by URLs or UNC paths, lower-cased.
    pub fn hosts(&self) -> Vec<String> {
        let from_urls = URL_HOST_RE
            .captures_iter(self.text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_ascii_lowercase()));
        let from_unc = UNC_HOST_RE
            .captures_iter(self.text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_ascii_lowercase()));
        unique(from_urls.chain(from_unc))
    }
}

pub(crate) fn unique<I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}
