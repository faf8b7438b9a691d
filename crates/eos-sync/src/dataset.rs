//! Reading and atomically rewriting `data/opportunities.json`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Local};
use eos_core::RawRecord;
use eos_storage::{load_dataset_file, write_atomic, DatasetError, WrittenFile};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub last_updated: String,
    pub total_count: usize,
    pub sources: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub by_state: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDocument {
    pub opportunities: Vec<RawRecord>,
    pub metadata: DatasetMetadata,
}

fn tally(records: &[RawRecord], keys: &[&str], missing: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        let key = record.text(keys).unwrap_or_else(|| missing.to_string());
        *counts.entry(key).or_default() += 1;
    }
    counts
}

pub fn build_metadata(records: &[RawRecord], now: DateTime<Local>) -> DatasetMetadata {
    DatasetMetadata {
        last_updated: now.to_rfc3339(),
        total_count: records.len(),
        sources: tally(records, &["source"], "unknown"),
        by_category: tally(records, &["category"], "Other"),
        by_state: tally(records, &["state"], "Unknown"),
    }
}

/// Existing records, or none when the file does not exist yet.
pub fn read_existing(path: &Path) -> Result<Vec<RawRecord>, DatasetError> {
    match load_dataset_file(path) {
        Err(DatasetError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        other => other,
    }
}

pub async fn write_dataset(path: &Path, records: Vec<RawRecord>, now: DateTime<Local>) -> anyhow::Result<WrittenFile> {
    let metadata = build_metadata(&records, now);
    let document = DatasetDocument {
        opportunities: records,
        metadata,
    };
    let mut bytes = serde_json::to_vec_pretty(&document).context("serializing dataset")?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
        .await
        .with_context(|| format!("writing dataset {}", path.display()))
}
