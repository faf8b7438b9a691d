//! Turning an issue-form submission into a dataset entry.

use std::path::Path;

use chrono::{Local, NaiveDate};
use eos_adapters::{IssueError, IssueForm};
use eos_storage::{short_hash, DatasetError};
use thiserror::Error;
use tracing::{info, info_span, Instrument};

use crate::dataset::{read_existing, write_dataset};
use crate::dedup::{find_duplicate, DuplicateMatch};
use crate::summarize::{enrich_description, EnrichmentHook};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid submission: {0}")]
    Invalid(#[from] IssueError),
    #[error("reading existing dataset: {0}")]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Write(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Appended { id: String, total: usize },
    Duplicate { id: String, matched: DuplicateMatch },
}

/// First 12 hex chars of SHA-256 over url, title and deadline.
pub fn record_id(url: &str, title: &str, deadline: &str) -> String {
    short_hash(&format!("{url}{title}{deadline}"))
}

pub async fn ingest_issue(
    body: &str,
    data_path: &Path,
    enrichment: &dyn EnrichmentHook,
    today: NaiveDate,
) -> Result<IngestOutcome, IngestError> {
    let span = info_span!("ingest_issue", path = %data_path.display());
    async move {
        let mut submission = IssueForm::parse(body).submission();
        submission.validate()?;

        let url = submission.primary_url().unwrap_or_default().to_string();
        let id = record_id(&url, submission.title.trim(), submission.deadline.trim());
        let urls: Vec<String> = [&submission.apply_url, &submission.info_url]
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();

        let mut records = read_existing(data_path)?;
        if let Some(matched) = find_duplicate(&records, Some(&id), &urls) {
            info!(%id, ?matched, "submission already listed");
            return Ok(IngestOutcome::Duplicate { id, matched });
        }

        let description = std::mem::take(&mut submission.description);
        submission.description = enrich_description(enrichment, &submission.title, description).await;

        records.push(submission.into_record(id.clone(), today));
        let total = records.len();
        write_dataset(data_path, records, Local::now()).await?;
        info!(%id, total, "submission appended");
        Ok(IngestOutcome::Appended { id, total })
    }
    .instrument(span)
    .await
}
