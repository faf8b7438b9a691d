//! Source adapter contracts and the HTML scrapers that feed the dataset.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eos_core::RawRecord;
use eos_storage::{short_hash, FetchError, HttpFetcher};
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

mod html;

pub mod article;
pub mod cpsc;
pub mod ftc;
pub mod issue;
pub mod topclassactions;

pub use article::{ArticleError, ArticleSubmission, Faq};
pub use issue::{IssueError, IssueForm, IssueSubmission};

pub const CRATE_NAME: &str = "eos-adapters";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub content_type: Option<String>,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

impl FetchedPage {
    pub fn from_html(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: Some("text/html".to_string()),
            body: body.into(),
            fetched_at: Utc::now(),
        }
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingTarget {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailTarget {
    pub url: String,
}

/// What a listing page yields: finished records, detail pages still to visit, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingParse {
    pub records: Vec<RawRecord>,
    pub details: Vec<DetailTarget>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid selector {0}")]
    Selector(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Fields every scraped opportunity carries, before it becomes a [`RawRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedOpportunity {
    pub title: String,
    pub category: String,
    pub amount: String,
    pub deadline: String,
    pub difficulty: String,
    pub description: String,
    pub claim_url: String,
    pub details_url: String,
    pub value: String,
    pub source: String,
}

impl ScrapedOpportunity {
    pub fn id(&self) -> String {
        short_hash(&format!("{}{}", self.title, self.details_url))
    }

    pub fn into_record(self) -> RawRecord {
        RawRecord::from_pairs([
            ("id", Value::from(self.id())),
            ("title", Value::from(self.title)),
            ("category", Value::from(self.category)),
            ("amount", Value::from(self.amount)),
            ("deadline", Value::from(self.deadline)),
            ("difficulty", Value::from(self.difficulty)),
            ("description", Value::from(self.description)),
            ("url", Value::from(self.claim_url)),
            ("detailsUrl", Value::from(self.details_url)),
            ("state", Value::from(eos_core::NATIONWIDE)),
            ("value", Value::from(self.value)),
            ("featured", Value::from(false)),
            ("source", Value::from(self.source)),
        ])
    }
}

pub async fn fetch_page(http: &HttpFetcher, url: &str) -> Result<FetchedPage, AdapterError> {
    let response = http.fetch_bytes(url).await?;
    Ok(FetchedPage {
        url: response.final_url,
        content_type: response.content_type,
        body: String::from_utf8_lossy(&response.body).into_owned(),
        fetched_at: Utc::now(),
    })
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;
    fn display_name(&self) -> &'static str;

    /// Index pages to visit for up to `max_items` opportunities.
    fn listing_targets(&self, max_items: usize) -> Vec<ListingTarget>;

    fn parse_listing(&self, page: &FetchedPage, max_items: usize) -> Result<ListingParse, AdapterError>;

    fn parse_detail(&self, _page: &FetchedPage) -> Result<Option<RawRecord>, AdapterError> {
        Ok(None)
    }

    /// Fetch listings (or `listing_urls` when given), then detail pages.
    /// A failed first listing page fails the source; later failures only
    /// shorten the result.
    async fn scrape(
        &self,
        http: &HttpFetcher,
        max_items: usize,
        listing_urls: &[String],
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let targets = if listing_urls.is_empty() {
            self.listing_targets(max_items)
        } else {
            listing_urls
                .iter()
                .map(|url| ListingTarget { url: url.clone() })
                .collect()
        };

        let mut records = Vec::new();
        let mut details: Vec<DetailTarget> = Vec::new();
        for (index, target) in targets.iter().enumerate() {
            let page = match fetch_page(http, &target.url).await {
                Ok(page) => page,
                Err(err) if index == 0 => return Err(err),
                Err(err) => {
                    warn!(source = self.source_id(), url = %target.url, error = %err, "listing page failed");
                    break;
                }
            };
            let parsed = self.parse_listing(&page, max_items)?;
            debug!(
                source = self.source_id(),
                url = %target.url,
                records = parsed.records.len(),
                details = parsed.details.len(),
                "parsed listing page"
            );
            records.extend(parsed.records);
            for detail in parsed.details {
                if !details.contains(&detail) {
                    details.push(detail);
                }
            }
            if records.len() + details.len() >= max_items {
                break;
            }
        }

        details.truncate(max_items.saturating_sub(records.len()));
        for detail in &details {
            let outcome = match fetch_page(http, &detail.url).await {
                Ok(page) => self.parse_detail(&page),
                Err(err) => Err(err),
            };
            match outcome {
                Ok(Some(record)) => records.push(record),
                Ok(None) => debug!(source = self.source_id(), url = %detail.url, "detail page had no record"),
                Err(err) => warn!(source = self.source_id(), url = %detail.url, error = %err, "detail page failed"),
            }
        }

        records.truncate(max_items);
        info!(source = self.source_id(), count = records.len(), "scraped source");
        Ok(records)
    }
}

pub fn adapter_for_source(source_id: &str) -> Option<Box<dyn SourceAdapter>> {
    match source_id {
        topclassactions::SOURCE_ID => Some(Box::new(topclassactions::TopClassActions)),
        ftc::SOURCE_ID => Some(Box::new(ftc::FtcRefunds)),
        cpsc::SOURCE_ID => Some(Box::new(cpsc::CpscRecalls)),
        _ => None,
    }
}

pub fn known_source_ids() -> [&'static str; 3] {
    [topclassactions::SOURCE_ID, ftc::SOURCE_ID, cpsc::SOURCE_ID]
}

#[cfg(test)]
mod tests {
    use super::*;
    use eos_storage::HttpClientConfig;
    use std::time::Duration;

    #[test]
    fn registry_knows_every_source() {
        for id in known_source_ids() {
            let adapter = adapter_for_source(id).expect("adapter");
            assert_eq!(adapter.source_id(), id);
            assert!(!adapter.listing_targets(10).is_empty());
        }
        assert!(adapter_for_source("nope").is_none());
    }

    #[test]
    fn scraped_records_carry_hash_ids_and_nationwide_state() {
        let scraped = ScrapedOpportunity {
            title: "FTC: Acme refunds".into(),
            category: "Unclaimed money & refunds".into(),
            amount: "Varies".into(),
            deadline: "Check program".into(),
            difficulty: "Medium".into(),
            description: "d".into(),
            claim_url: "https://www.ftc.gov/acme".into(),
            details_url: "https://www.ftc.gov/acme".into(),
            value: "good".into(),
            source: "ftc.gov".into(),
        };
        let id = scraped.id();
        assert_eq!(id.len(), 12);
        let record = scraped.into_record();
        assert_eq!(record.text(&["id"]), Some(id));
        assert_eq!(record.text(&["state"]).as_deref(), Some("Nationwide"));
        assert_eq!(record.flag(&["featured"]), Some(false));
    }

    #[tokio::test]
    async fn unreachable_first_listing_fails_the_source() {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_millis(300),
            backoff: eos_storage::BackoffPolicy::none(),
            ..Default::default()
        })
        .unwrap();
        let adapter = ftc::FtcRefunds;
        let err = adapter
            .scrape(&http, 5, &["http://127.0.0.1:9/refunds".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Fetch(_)));
    }
}
