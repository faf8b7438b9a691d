//! Dataset maintenance: scheduled scraping runs, issue ingestion and expiry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use eos_adapters::{adapter_for_source, issue::COMMUNITY_SOURCE};
use eos_core::RawRecord;
use eos_storage::{BackoffPolicy, HttpClientConfig, HttpFetcher};
use serde::{Deserialize, Serialize};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod dataset;
pub mod dedup;
pub mod expire;
pub mod ingest;
pub mod summarize;

pub use dataset::{build_metadata, read_existing, write_dataset, DatasetDocument, DatasetMetadata};
pub use dedup::{find_duplicate, DedupConfig, DedupEngine, DedupHook, DuplicateMatch, NoopDedupHook};
pub use expire::expire;
pub use ingest::{ingest_issue, record_id, IngestError, IngestOutcome};
pub use summarize::{enrich_description, EnrichmentHook, HttpSummarizer, NoopEnrichmentHook};

pub const CRATE_NAME: &str = "eos-sync";

fn default_enabled() -> bool {
    true
}

fn default_max_items() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the adapter's own listing pages when non-empty.
    #[serde(default)]
    pub listing_urls: Vec<String>,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SourceRegistry {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing source registry")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn enabled(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub data_path: PathBuf,
    pub sources_path: PathBuf,
    pub scheduler_enabled: bool,
    pub scrape_cron: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    /// Politeness gap between requests to scraped sites.
    pub request_interval_ms: u64,
    pub summarizer_url: Option<String>,
    pub summarizer_api_key: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/opportunities.json"),
            sources_path: PathBuf::from("sources.yaml"),
            scheduler_enabled: false,
            scrape_cron: "0 0 6 * * *".to_string(),
            user_agent: "eosguide-bot/0.1".to_string(),
            http_timeout_secs: 15,
            request_interval_ms: 2000,
            summarizer_url: None,
            summarizer_api_key: None,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_path: env_opt("EOS_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            sources_path: env_opt("EOS_SOURCES_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.sources_path),
            scheduler_enabled: env_flag("EOS_SCHEDULER_ENABLED"),
            scrape_cron: env_opt("EOS_SCRAPE_CRON").unwrap_or(defaults.scrape_cron),
            user_agent: env_opt("EOS_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: env_parse("EOS_HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
            request_interval_ms: env_parse("EOS_REQUEST_INTERVAL_MS", defaults.request_interval_ms),
            summarizer_url: env_opt("EOS_SUMMARIZER_URL"),
            summarizer_api_key: env_opt("EOS_SUMMARIZER_API_KEY"),
        }
    }

    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            max_in_flight: 2,
            min_request_interval: Duration::from_millis(self.request_interval_ms),
            backoff: BackoffPolicy::default(),
        }
    }

    /// The summarizer when one is configured, otherwise a no-op.
    pub fn enrichment_hook(&self) -> Result<Box<dyn EnrichmentHook>> {
        match &self.summarizer_url {
            Some(url) => Ok(Box::new(HttpSummarizer::new(
                url.clone(),
                self.summarizer_api_key.clone(),
                Duration::from_secs(self.http_timeout_secs),
            )?)),
            None => Ok(Box::<NoopEnrichmentHook>::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRunReport {
    pub source_id: String,
    pub display_name: String,
    pub status: SourceStatus,
    pub records: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceRunReport>,
    pub scraped: usize,
    pub kept_community: usize,
    pub duplicates_removed: usize,
    pub expired: usize,
    pub total_written: usize,
    /// False when nothing was scraped and the dataset was left untouched.
    pub written: bool,
    pub data_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub records: Vec<RawRecord>,
    pub kept_community: usize,
    pub duplicates_removed: usize,
    pub expired: usize,
}

/// Combine a fresh scrape with the current dataset.
///
/// Community submissions survive a scrape and win title, id and URL
/// collisions. A record already known by id keeps its original `date_found`;
/// new ones get `today`.
pub fn merge_scraped(
    existing: Vec<RawRecord>,
    scraped: Vec<RawRecord>,
    today: NaiveDate,
    dedup: &dyn DedupHook,
) -> MergeOutcome {
    let mut first_seen: HashMap<String, String> = HashMap::new();
    let mut community = Vec::new();
    for record in existing {
        if let (Some(id), Some(found)) = (record.text(&["id"]), record.text(&["date_found", "dateFound"])) {
            first_seen.insert(id, found);
        }
        if record.text(&["source"]).as_deref() == Some(COMMUNITY_SOURCE) {
            community.push(record);
        }
    }
    let kept_community = community.len();

    let stamp = today.format("%Y-%m-%d").to_string();
    let mut combined = community;
    for mut record in scraped {
        let found = record
            .text(&["id"])
            .and_then(|id| first_seen.get(&id).cloned())
            .unwrap_or_else(|| stamp.clone());
        record.insert("date_found", found);
        combined.push(record);
    }

    let before = combined.len();
    let unique = unique_ids_and_urls(dedup.apply(combined));
    let duplicates_removed = before - unique.len();
    let (records, expired) = expire(unique, today);

    MergeOutcome {
        records,
        kept_community,
        duplicates_removed,
        expired,
    }
}

/// First record wins any id or URL collision.
fn unique_ids_and_urls(records: Vec<RawRecord>) -> Vec<RawRecord> {
    let mut kept: Vec<RawRecord> = Vec::with_capacity(records.len());
    for record in records {
        let id = record.text(&["id"]);
        if let Some(matched) = find_duplicate(&kept, id.as_deref(), &record.link_urls()) {
            debug!(id = ?id, ?matched, "dropping scraped duplicate");
            continue;
        }
        kept.push(record);
    }
    kept
}

pub struct SyncPipeline {
    config: SyncConfig,
    http: HttpFetcher,
    dedup: Box<dyn DedupHook>,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let http = HttpFetcher::new(config.http_config())?;
        Ok(Self {
            config,
            http,
            dedup: Box::<DedupEngine>::default(),
        })
    }

    pub fn with_dedup(mut self, dedup: Box<dyn DedupHook>) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn run_once(&self) -> Result<ScrapeRunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("scrape_run", %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<ScrapeRunSummary> {
        let started_at = Utc::now();
        let registry = SourceRegistry::load(&self.config.sources_path).await?;

        let mut reports = Vec::new();
        let mut scraped = Vec::new();
        for source in registry.enabled() {
            let Some(adapter) = adapter_for_source(&source.source_id) else {
                warn!(source = %source.source_id, "no adapter registered; skipping");
                reports.push(SourceRunReport {
                    source_id: source.source_id.clone(),
                    display_name: source.display_name.clone(),
                    status: SourceStatus::Skipped,
                    records: 0,
                    error: Some("no adapter registered".to_string()),
                });
                continue;
            };

            match adapter.scrape(&self.http, source.max_items, &source.listing_urls).await {
                Ok(records) => {
                    info!(source = %source.source_id, count = records.len(), "source finished");
                    reports.push(SourceRunReport {
                        source_id: source.source_id.clone(),
                        display_name: source.display_name.clone(),
                        status: SourceStatus::Ok,
                        records: records.len(),
                        error: None,
                    });
                    scraped.extend(records);
                }
                Err(err) => {
                    warn!(source = %source.source_id, error = %err, "source failed; continuing");
                    reports.push(SourceRunReport {
                        source_id: source.source_id.clone(),
                        display_name: source.display_name.clone(),
                        status: SourceStatus::Failed,
                        records: 0,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let data_path = self.config.data_path.display().to_string();
        let scraped_count = scraped.len();
        if scraped.is_empty() {
            warn!("no opportunities scraped; dataset left untouched");
            return Ok(ScrapeRunSummary {
                run_id,
                started_at,
                finished_at: Utc::now(),
                sources: reports,
                scraped: 0,
                kept_community: 0,
                duplicates_removed: 0,
                expired: 0,
                total_written: 0,
                written: false,
                data_path,
            });
        }

        let existing = read_existing(&self.config.data_path)
            .with_context(|| format!("reading {}", self.config.data_path.display()))?;
        let today = Local::now().date_naive();
        let merged = merge_scraped(existing, scraped, today, self.dedup.as_ref());
        let total_written = merged.records.len();
        write_dataset(&self.config.data_path, merged.records, Local::now()).await?;
        info!(total = total_written, path = %data_path, "dataset written");

        Ok(ScrapeRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            sources: reports,
            scraped: scraped_count,
            kept_community: merged.kept_community,
            duplicates_removed: merged.duplicates_removed,
            expired: merged.expired,
            total_written,
            written: true,
            data_path,
        })
    }

    /// A scheduler running [`Self::run_once`] on the configured cron, when enabled.
    pub async fn maybe_build_scheduler(self: Arc<Self>) -> Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let cron = self.config.scrape_cron.clone();
        let pipeline = Arc::clone(&self);
        let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move {
                match pipeline.run_once().await {
                    Ok(summary) => info!(
                        total = summary.total_written,
                        written = summary.written,
                        "scheduled scrape finished"
                    ),
                    Err(err) => error!(error = %err, "scheduled scrape failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        Ok(Some(sched))
    }
}

/// Remove past-deadline records from the dataset file in place.
pub async fn expire_file(path: &Path, today: NaiveDate) -> Result<(usize, usize)> {
    let records = read_existing(path).with_context(|| format!("reading {}", path.display()))?;
    let (kept, removed) = expire(records, today);
    let remaining = kept.len();
    if removed > 0 {
        write_dataset(path, kept, Local::now()).await?;
    }
    info!(removed, remaining, "expiry pass complete");
    Ok((remaining, removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    const REGISTRY: &str = r#"
sources:
  - source_id: topclassactions
    display_name: Top Class Actions
    max_items: 25
  - source_id: ftc-refunds
    display_name: FTC Refunds
    enabled: false
  - source_id: cpsc-recalls
    display_name: CPSC Recalls
    listing_urls: ["https://www.cpsc.gov/Recalls?page=1"]
"#;

    #[test]
    fn registry_defaults_apply() {
        let registry = SourceRegistry::from_yaml_str(REGISTRY).unwrap();
        assert_eq!(registry.sources.len(), 3);
        let enabled: Vec<&str> = registry.enabled().map(|s| s.source_id.as_str()).collect();
        assert_eq!(enabled, vec!["topclassactions", "cpsc-recalls"]);
        assert_eq!(registry.sources[0].max_items, 25);
        assert_eq!(registry.sources[2].max_items, 100);
        assert_eq!(registry.sources[2].listing_urls.len(), 1);
    }

    #[test]
    fn merge_keeps_community_entries_and_first_seen_dates() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let existing = vec![
            RawRecord::from_pairs([
                ("id", json!("c1")),
                ("title", json!("Local Grant")),
                ("source", json!("community")),
                ("date_found", json!("2026-01-02")),
            ]),
            RawRecord::from_pairs([
                ("id", json!("s1")),
                ("title", json!("FTC: Old")),
                ("source", json!("ftc.gov")),
                ("date_found", json!("2026-03-04")),
            ]),
            RawRecord::from_pairs([("id", json!("gone")), ("title", json!("Dropped")), ("source", json!("cpsc.gov"))]),
        ];
        let scraped = vec![
            RawRecord::from_pairs([("id", json!("s1")), ("title", json!("FTC: Old")), ("source", json!("ftc.gov"))]),
            RawRecord::from_pairs([("id", json!("s2")), ("title", json!("local grant")), ("source", json!("ftc.gov"))]),
            RawRecord::from_pairs([
                ("id", json!("s3")),
                ("title", json!("Expired Thing")),
                ("deadline", json!("2026-05-01")),
            ]),
            RawRecord::from_pairs([("id", json!("s4")), ("title", json!("Fresh"))]),
        ];

        let merged = merge_scraped(existing, scraped, today, &DedupEngine::default());
        assert_eq!(merged.kept_community, 1);
        assert_eq!(merged.duplicates_removed, 1);
        assert_eq!(merged.expired, 1);

        let ids: Vec<String> = merged.records.iter().filter_map(|r| r.text(&["id"])).collect();
        assert_eq!(ids, vec!["c1", "s1", "s4"]);
        assert_eq!(merged.records[1].text(&["date_found"]).as_deref(), Some("2026-03-04"));
        assert_eq!(merged.records[2].text(&["date_found"]).as_deref(), Some("2026-06-01"));
    }

    #[test]
    fn merge_drops_scraped_records_sharing_a_community_url() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let existing = vec![RawRecord::from_pairs([
            ("id", json!("c1")),
            ("title", json!("Acme Settlement")),
            ("apply_url", json!("https://acmesettlement.com/claim")),
            ("source", json!("community")),
        ])];
        let scraped = vec![
            RawRecord::from_pairs([
                ("id", json!("s1")),
                ("title", json!("Acme Data Breach Class Action")),
                ("url", json!("https://acmesettlement.com/claim")),
            ]),
            RawRecord::from_pairs([
                ("id", json!("c1")),
                ("title", json!("Renamed Upstream")),
                ("url", json!("https://other.example")),
            ]),
            RawRecord::from_pairs([
                ("id", json!("s2")),
                ("title", json!("Globex Refunds")),
                ("details_url", json!("https://globex.example")),
            ]),
        ];

        let merged = merge_scraped(existing, scraped, today, &DedupEngine::default());
        assert_eq!(merged.duplicates_removed, 2);
        let ids: Vec<String> = merged.records.iter().filter_map(|r| r.text(&["id"])).collect();
        assert_eq!(ids, vec!["c1", "s2"]);
        assert_eq!(merged.records[0].text(&["title"]).as_deref(), Some("Acme Settlement"));
    }

    #[test]
    fn noop_dedup_keeps_title_collisions() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let scraped = vec![
            RawRecord::from_pairs([("id", json!("a")), ("title", json!("Same"))]),
            RawRecord::from_pairs([("id", json!("b")), ("title", json!("same"))]),
        ];
        let merged = merge_scraped(Vec::new(), scraped, today, &NoopDedupHook);
        assert_eq!(merged.records.len(), 2);
        assert_eq!(merged.duplicates_removed, 0);
    }

    #[tokio::test]
    async fn run_without_usable_sources_leaves_dataset_untouched() {
        let dir = tempdir().unwrap();
        let sources_path = dir.path().join("sources.yaml");
        std::fs::write(
            &sources_path,
            "sources:\n  - source_id: unknown-site\n    display_name: Unknown\n",
        )
        .unwrap();
        let data_path = dir.path().join("opportunities.json");
        std::fs::write(&data_path, "[]").unwrap();

        let pipeline = SyncPipeline::new(SyncConfig {
            data_path: data_path.clone(),
            sources_path,
            ..Default::default()
        })
        .unwrap()
        .with_dedup(Box::new(NoopDedupHook));
        let summary = pipeline.run_once().await.unwrap();
        assert!(!summary.written);
        assert_eq!(summary.sources.len(), 1);
        assert_eq!(summary.sources[0].status, SourceStatus::Skipped);
        assert_eq!(std::fs::read_to_string(&data_path).unwrap(), "[]");
    }

    #[tokio::test]
    async fn expire_file_rewrites_only_when_needed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("opportunities.json");
        std::fs::write(
            &path,
            r#"[{"title":"old","deadline":"2020-01-01"},{"title":"open","deadline":"Ongoing"}]"#,
        )
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

        assert_eq!(expire_file(&path, today).await.unwrap(), (1, 1));
        let after = read_existing(&path).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].title().as_deref(), Some("open"));

        let before = std::fs::read_to_string(&path).unwrap();
        assert_eq!(expire_file(&path, today).await.unwrap(), (1, 0));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn scheduler_is_off_by_default() {
        let pipeline = Arc::new(SyncPipeline::new(SyncConfig::default()).unwrap());
        assert!(pipeline.maybe_build_scheduler().await.unwrap().is_none());
    }
}
