//! Supplemental literature lookup.
//!
//! Any failure here degrades to "no web context"; the caller never sees an
//! error.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use dxrag_core::error::{Error, Result};
use dxrag_core::traits::WebSearch;
use dxrag_core::types::WebResult;

const DDG_ENDPOINT: &str = "https://api.duckduckgo.com/";

/// Query aimed at clinical reference sites.
pub fn targeted_query(query: &str) -> String {
    format!("{query} clinical guidelines diagnosis treatment site:ncbi.nlm.nih.gov OR site:uptodate.com OR site:cdc.gov")
}

pub fn fallback_query(query: &str) -> String {
    format!("{query} diagnosis treatment clinical guidelines")
}

/// `• **<title>**: <snippet>` per result, newline-separated.
pub fn format_results(results: &[WebResult]) -> String {
    results.iter().map(|r| format!("• **{}**: {}", r.title, r.snippet)).collect::<Vec<_>>().join("\n")
}

#[derive(Debug)]
pub enum WebLookup {
    Found(Vec<WebResult>),
    Empty,
    Failed(Error),
}

impl WebLookup {
    /// Formatted context, or an empty string for anything but `Found`.
    pub fn into_context(self) -> String {
        match self {
            Self::Found(results) => format_results(&results),
            Self::Empty | Self::Failed(_) => String::new(),
        }
    }
}

/// Targeted-then-fallback lookup over a [`WebSearch`] backend.
#[derive(Clone)]
pub struct WebSearcher {
    backend: Arc<dyn WebSearch>,
    max_results: usize,
}

impl WebSearcher {
    pub fn new(backend: Arc<dyn WebSearch>, max_results: usize) -> Self {
        Self { backend, max_results }
    }

    pub async fn lookup(&self, query: &str) -> WebLookup {
        for q in [targeted_query(query), fallback_query(query)] {
            match self.backend.search(&q, self.max_results).await {
                Ok(results) if results.is_empty() => debug!(query = %q, "No web results"),
                Ok(mut results) => {
                    results.truncate(self.max_results);
                    info!(results = results.len(), "Web search returned results");
                    return WebLookup::Found(results);
                }
                Err(e) => {
                    warn!(error = %e, "Web search failed, continuing without it");
                    return WebLookup::Failed(e);
                }
            }
        }
        WebLookup::Empty
    }

    pub async fn context(&self, query: &str) -> String {
        self.lookup(query).await.into_context()
    }
}

/// DuckDuckGo Instant Answer API.
pub struct DuckDuckGo {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGo {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("dxrag/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, endpoint: DDG_ENDPOINT.to_string() })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstantAnswer {
    #[serde(rename = "Heading")]
    heading: String,
    #[serde(rename = "AbstractText")]
    abstract_text: String,
    #[serde(rename = "RelatedTopics")]
    related_topics: Vec<Topic>,
}

/// Either a leaf topic or a named group of topics.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Topic {
    #[serde(rename = "Text")]
    text: String,
    #[serde(rename = "Topics")]
    topics: Vec<Topic>,
}

impl InstantAnswer {
    fn into_results(self, max: usize) -> Vec<WebResult> {
        let mut out = Vec::new();
        if !self.abstract_text.trim().is_empty() {
            out.push(WebResult { title: self.heading, snippet: self.abstract_text });
        }
        let mut stack: Vec<Topic> = self.related_topics.into_iter().rev().collect();
        while let Some(topic) = stack.pop() {
            if out.len() >= max {
                break;
            }
            if topic.topics.is_empty() {
                if let Some(result) = topic_result(&topic.text) {
                    out.push(result);
                }
            } else {
                stack.extend(topic.topics.into_iter().rev());
            }
        }
        out.truncate(max);
        out
    }
}

/// Topic text reads `<title> - <description>`; without a dash the whole text
/// is both.
fn topic_result(text: &str) -> Option<WebResult> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let (title, snippet) = text.split_once(" - ").unwrap_or((text, text));
    Some(WebResult { title: title.trim().to_string(), snippet: snippet.trim().to_string() })
}

#[async_trait]
impl WebSearch for DuckDuckGo {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json"), ("no_html", "1"), ("skip_disambig", "1")])
            .send()
            .await
            .map_err(|e| Error::WebSearch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::WebSearch(format!("DuckDuckGo returned {}", response.status())));
        }
        let answer: InstantAnswer = response.json().await.map_err(|e| Error::WebSearch(e.to_string()))?;
        Ok(answer.into_results(max_results))
    }
}
