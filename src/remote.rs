//! Default HTTP collaborators: document download and web search.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::traits::{FetchError, SearchError, SearchProvider, Transport};

pub const SEARCH_ENDPOINT: &str = "https://www.google.com/search";

/// Results requested per search page.
pub const BATCH_SIZE: usize = 100;

static RESULT_HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href="([^"]+)""#).expect("valid regex"));

/// Downloads documents with reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        identity: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let to_fetch_error = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    timeout_secs: timeout.as_secs(),
                }
            } else {
                FetchError::Request {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .header(USER_AGENT, identity)
            .send()
            .await
            .map_err(to_fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(to_fetch_error)?;
        debug!(%url, size = bytes.len(), "Downloaded");
        Ok(bytes.to_vec())
    }
}

/// Scrapes a web search engine's result pages, [`BATCH_SIZE`] results at a time.
///
/// Stops once `max_results` links are collected or a page adds nothing new.
/// The last page is kept whole, so the result can exceed `max_results`.
#[derive(Debug, Clone)]
pub struct WebSearch {
    client: Client,
    endpoint: String,
    delay: Duration,
}

impl WebSearch {
    pub fn new(delay: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
            endpoint: SEARCH_ENDPOINT.to_string(),
            delay,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn page_url(&self, query: &str, start: usize) -> Result<Url, SearchError> {
        let num = BATCH_SIZE.to_string();
        let start = start.to_string();
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("q", query),
                ("num", num.as_str()),
                ("start", start.as_str()),
                ("filter", "0"),
            ],
        )
        .map_err(|e| SearchError::Request(e.to_string()))
    }
}

#[async_trait]
impl SearchProvider for WebSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        identity: &str,
    ) -> Result<Vec<String>, SearchError> {
        let mut urls = Vec::new();
        let mut seen = HashSet::new();
        let mut start = 0;

        while urls.len() < max_results {
            if start > 0 {
                tokio::time::sleep(self.delay).await;
            }

            let response = self
                .client
                .get(self.page_url(query, start)?)
                .header(USER_AGENT, identity)
                .send()
                .await
                .map_err(|e| SearchError::Request(e.to_string()))?;
            if !response.status().is_success() {
                return Err(SearchError::Status(response.status().as_u16()));
            }
            let body = response
                .text()
                .await
                .map_err(|e| SearchError::Request(e.to_string()))?;

            let before = urls.len();
            for link in extract_result_links(&body) {
                if seen.insert(link.clone()) {
                    urls.push(link);
                }
            }
            debug!(%query, start, added = urls.len() - before, "Search page parsed");
            if urls.len() == before {
                break;
            }
            start += BATCH_SIZE;
        }

        Ok(urls)
    }
}

/// Pulls result links out of a search result page, in page order.
///
/// Handles both redirect links (`/url?q=<target>`) and direct links; links
/// back to the search engine itself are dropped.
pub fn extract_result_links(html: &str) -> Vec<String> {
    RESULT_HREF_RE
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .filter_map(|m| resolve_href(&m.as_str().replace("&amp;", "&")))
        .collect()
}

fn resolve_href(href: &str) -> Option<String> {
    let target = if href.starts_with("/url?") {
        let redirect = Url::parse("https://search.invalid").ok()?.join(href).ok()?;
        let (_, q) = redirect.query_pairs().find(|(k, _)| k == "q" || k == "url")?;
        Url::parse(&q).ok()?
    } else {
        Url::parse(href).ok()?
    };

    if !matches!(target.scheme(), "http" | "https") {
        return None;
    }
    let host = target.host_str()?;
    if host.contains("google.") || host.ends_with("gstatic.com") {
        return None;
    }
    Some(target.to_string())
}
