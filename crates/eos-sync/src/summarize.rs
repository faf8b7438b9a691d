//! Optional description enrichment through an external summarization API.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[async_trait]
pub trait EnrichmentHook: Send + Sync {
    /// A replacement description, or `None` to keep the submitted one.
    async fn summarize(&self, title: &str, description: &str) -> anyhow::Result<Option<String>>;
}

#[derive(Default)]
pub struct NoopEnrichmentHook;

#[async_trait]
impl EnrichmentHook for NoopEnrichmentHook {
    async fn summarize(&self, _title: &str, _description: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Serialize)]
struct SummarizeRequest<'a> {
    title: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SummarizeResponse {
    summary: Option<String>,
}

/// POSTs `{"title","text"}` and reads `{"summary"}` back.
pub struct HttpSummarizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSummarizer {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building summarizer client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl EnrichmentHook for HttpSummarizer {
    async fn summarize(&self, title: &str, description: &str) -> anyhow::Result<Option<String>> {
        if description.trim().is_empty() {
            return Ok(None);
        }
        let mut request = self.client.post(&self.endpoint).json(&SummarizeRequest {
            title,
            text: description,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.context("calling summarizer")?;
        let status = response.status();
        if !status.is_success() {
            bail!("summarizer returned {status}");
        }
        let body: SummarizeResponse = response.json().await.context("decoding summarizer response")?;
        Ok(body.summary.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
    }
}

/// Run the hook; any failure keeps the original description.
pub async fn enrich_description(hook: &dyn EnrichmentHook, title: &str, description: String) -> String {
    match hook.summarize(title, &description).await {
        Ok(Some(summary)) => summary,
        Ok(None) => description,
        Err(err) => {
            warn!(error = %err, "summarization failed; keeping submitted description");
            description
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl EnrichmentHook for Failing {
        async fn summarize(&self, _title: &str, _description: &str) -> anyhow::Result<Option<String>> {
            bail!("boom")
        }
    }

    struct Shouting;

    #[async_trait]
    impl EnrichmentHook for Shouting {
        async fn summarize(&self, _title: &str, description: &str) -> anyhow::Result<Option<String>> {
            Ok(Some(description.to_uppercase()))
        }
    }

    #[tokio::test]
    async fn failures_keep_the_original() {
        assert_eq!(enrich_description(&Failing, "t", "keep me".into()).await, "keep me");
        assert_eq!(enrich_description(&NoopEnrichmentHook, "t", "same".into()).await, "same");
        assert_eq!(enrich_description(&Shouting, "t", "loud".into()).await, "LOUD");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let hook = HttpSummarizer::new("http://127.0.0.1:9/summarize", None, Duration::from_millis(300)).unwrap();
        assert!(hook.summarize("t", "some text").await.is_err());
        assert_eq!(hook.summarize("t", "  ").await.unwrap(), None);
    }
}
