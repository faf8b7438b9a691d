//! Local persistence, dataset loading and HTTP fetch utilities for eosguide.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub mod dataset;
pub mod saved;

pub use dataset::{load_dataset, load_dataset_file, parse_dataset, DatasetError, DatasetFormat, DatasetSource};
pub use saved::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, SavedStore, StoreError, SAVED_KEY};

pub const CRATE_NAME: &str = "eos-storage";

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// First 12 hex chars of the SHA-256 of `input`; the record id format.
pub fn short_hash(input: &str) -> String {
    let mut digest = sha256_hex(input.as_bytes());
    digest.truncate(12);
    digest
}

#[derive(Debug, Clone)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub content_hash: String,
    pub byte_size: usize,
}

fn temp_sibling(path: &Path, len: usize) -> PathBuf {
    let temp_name = format!(".{}.{}.tmp", Uuid::new_v4(), len);
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join(temp_name)
}

/// Replace `path` with `bytes` via a temp file in the same directory and a rename,
/// so readers never observe a half-written file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<WrittenFile> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }

    let temp_path = temp_sibling(path, bytes.len());
    let mut file = tokio::fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming {} -> {}",
                temp_path.display(),
                path.display()
            )
        });
    }

    Ok(WrittenFile {
        path: path.to_path_buf(),
        content_hash: sha256_hex(bytes),
        byte_size: bytes.len(),
    })
}

/// Blocking twin of [`write_atomic`] for the synchronous key-value store.
pub fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let temp_path = temp_sibling(path, bytes.len());
    std::fs::write(&temp_path, bytes)?;
    std::fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&temp_path);
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl BackoffPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub max_in_flight: usize,
    /// Minimum spacing between consecutive requests; zero disables pacing.
    pub min_request_interval: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: None,
            max_in_flight: 4,
            min_request_interval: Duration::ZERO,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Spaces requests out so scraped sites see at most one hit per interval.
#[derive(Debug)]
pub struct RequestPacer {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Time still to wait before the next request may go out.
    pub fn remaining(&self, last: Option<Instant>, now: Instant) -> Duration {
        match last {
            Some(prev) => self.interval.saturating_sub(now.saturating_duration_since(prev)),
            None => Duration::ZERO,
        }
    }

    pub async fn wait_turn(&self) {
        let mut last = self.last.lock().await;
        let wait = self.remaining(*last, Instant::now());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("fetcher closed before {url} could be requested")]
    Closed { url: String },
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    in_flight: Arc<Semaphore>,
    pacer: Option<RequestPacer>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            pacer: (!config.min_request_interval.is_zero())
                .then(|| RequestPacer::new(config.min_request_interval)),
            backoff: config.backoff,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Single GET, no retry. Used for the listing dataset.
    pub async fn fetch_once(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        self.fetch_with_policy(url, BackoffPolicy::none()).await
    }

    /// GET with the configured retry policy. Used by scrapers.
    pub async fn fetch_bytes(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        self.fetch_with_policy(url, self.backoff).await
    }

    async fn fetch_with_policy(
        &self,
        url: &str,
        backoff: BackoffPolicy,
    ) -> Result<FetchedResponse, FetchError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| FetchError::Closed { url: url.to_string() })?;

        let mut attempt = 0usize;
        loop {
            if let Some(pacer) = &self.pacer {
                pacer.wait_turn().await;
            }
            let outcome = self
                .client
                .get(url)
                .send()
                .instrument(info_span!("http_fetch", url, attempt))
                .await;

            let disposition = match outcome {
                Ok(resp) if resp.status().is_success() => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();
                    let content_type = resp
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let body = resp.bytes().await?.to_vec();
                    return Ok(FetchedResponse {
                        status,
                        final_url,
                        content_type,
                        body,
                    });
                }
                Ok(resp) => {
                    let err = FetchError::HttpStatus {
                        status: resp.status().as_u16(),
                        url: resp.url().to_string(),
                    };
                    (classify_status(resp.status()), err)
                }
                Err(err) => (classify_reqwest_error(&err), FetchError::Request(err)),
            };

            match disposition {
                (RetryDisposition::Retryable, err) if attempt < backoff.max_retries => {
                    let delay = backoff.delay_for_attempt(attempt);
                    debug!(url, attempt, ?delay, error = %err, "retrying fetch");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                (_, err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hashing_is_stable() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(short_hash("hello world"), "b94d27b9934d");
    }

    #[tokio::test]
    async fn closed_fetcher_reports_closed_not_a_status() {
        let fetcher = HttpFetcher::new(HttpClientConfig::default()).expect("fetcher");
        fetcher.in_flight.close();
        let err = fetcher.fetch_once("http://127.0.0.1:9/data.json").await.unwrap_err();
        assert!(matches!(err, FetchError::Closed { ref url } if url == "http://127.0.0.1:9/data.json"));
    }

    #[tokio::test]
    async fn atomic_write_replaces_and_leaves_no_temp_files() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("data").join("opportunities.json");

        write_atomic(&path, b"[1]").await.expect("first write");
        let second = write_atomic(&path, b"[1,2]").await.expect("second write");

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1,2]");
        assert_eq!(second.byte_size, 5);
        assert_eq!(second.content_hash, sha256_hex(b"[1,2]"));
        let leftovers = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn blocking_write_creates_parent_dirs() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested/store.json");
        write_atomic_blocking(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(350));
        assert_eq!(BackoffPolicy::none().max_retries, 0);
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), RetryDisposition::Retryable);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), RetryDisposition::Retryable);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), RetryDisposition::NonRetryable);
    }

    #[test]
    fn pacer_reports_remaining_wait() {
        let pacer = RequestPacer::new(Duration::from_secs(2));
        let now = Instant::now();
        assert_eq!(pacer.remaining(None, now), Duration::ZERO);
        let just_now = now;
        let later = now + Duration::from_millis(500);
        assert_eq!(pacer.remaining(Some(just_now), later), Duration::from_millis(1500));
        let much_later = now + Duration::from_secs(5);
        assert_eq!(pacer.remaining(Some(just_now), much_later), Duration::ZERO);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_request_error() {
        let fetcher = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap();
        let err = fetcher.fetch_once("http://127.0.0.1:9/nothing").await.unwrap_err();
        assert!(matches!(err, FetchError::Request(_)));
    }
}
