//! Loading the opportunity dataset from disk or over HTTP.

use std::fmt;
use std::path::{Path, PathBuf};

use eos_core::RawRecord;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{FetchError, HttpFetcher};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("reading dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("fetching dataset: {0}")]
    Fetch(#[from] FetchError),
    #[error("dataset is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("dataset is not valid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("unexpected dataset shape: {0}")]
    Shape(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    File(PathBuf),
    Url(String),
}

impl DatasetSource {
    pub fn parse(location: &str) -> Self {
        let trimmed = location.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else {
            Self::File(PathBuf::from(trimmed))
        }
    }
}

impl fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Json,
    Csv,
}

impl DatasetFormat {
    pub fn from_extension(name: &str) -> Option<Self> {
        let path = name.split(['?', '#']).next().unwrap_or(name);
        match Path::new(path).extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    fn from_content_type(content_type: &str) -> Option<Self> {
        let lower = content_type.to_ascii_lowercase();
        if lower.contains("json") {
            Some(Self::Json)
        } else if lower.contains("csv") {
            Some(Self::Csv)
        } else {
            None
        }
    }

    fn sniff(bytes: &[u8]) -> Self {
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'[') | Some(b'{') => Self::Json,
            _ => Self::Csv,
        }
    }
}

/// Parse dataset bytes. Without an explicit format the content is sniffed.
pub fn parse_dataset(bytes: &[u8], format: Option<DatasetFormat>) -> Result<Vec<RawRecord>, DatasetError> {
    match format.unwrap_or_else(|| DatasetFormat::sniff(bytes)) {
        DatasetFormat::Json => parse_json(bytes),
        DatasetFormat::Csv => parse_csv(bytes),
    }
}

fn parse_json(bytes: &[u8]) -> Result<Vec<RawRecord>, DatasetError> {
    let items = match serde_json::from_slice::<Value>(bytes)? {
        Value::Array(items) => items,
        Value::Object(mut wrapper) => match wrapper.remove("opportunities") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(DatasetError::Shape("`opportunities` is not an array".into())),
            None => return Err(DatasetError::Shape("object without an `opportunities` array".into())),
        },
        other => {
            return Err(DatasetError::Shape(format!(
                "expected an array or object, found {}",
                json_kind(&other)
            )))
        }
    };

    let total = items.len();
    let records: Vec<RawRecord> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(RawRecord(map)),
            _ => None,
        })
        .collect();
    if records.len() != total {
        warn!(skipped = total - records.len(), "dataset entries that are not objects were skipped");
    }
    Ok(records)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<RawRecord>, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = RawRecord::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            // Blank cells stay absent so the normalizer applies its defaults.
            if !header.is_empty() && !cell.is_empty() {
                record.insert(header, cell);
            }
        }
        records.push(record);
    }
    Ok(records)
}

pub fn load_dataset_file(path: &Path) -> Result<Vec<RawRecord>, DatasetError> {
    let bytes = std::fs::read(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let format = path.to_str().and_then(DatasetFormat::from_extension);
    parse_dataset(&bytes, format)
}

/// One attempt only; the caller shows the failure instead of retrying.
pub async fn load_dataset(source: &DatasetSource, fetcher: &HttpFetcher) -> Result<Vec<RawRecord>, DatasetError> {
    match source {
        DatasetSource::File(path) => {
            let bytes = tokio::fs::read(path).await.map_err(|source| DatasetError::Io {
                path: path.clone(),
                source,
            })?;
            let format = path.to_str().and_then(DatasetFormat::from_extension);
            parse_dataset(&bytes, format)
        }
        DatasetSource::Url(url) => {
            let response = fetcher.fetch_once(url).await?;
            let format = response
                .content_type
                .as_deref()
                .and_then(DatasetFormat::from_content_type)
                .or_else(|| DatasetFormat::from_extension(&response.final_url));
            debug!(url, bytes = response.body.len(), ?format, "fetched dataset");
            parse_dataset(&response.body, format)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpClientConfig;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn source_parsing() {
        assert_eq!(
            DatasetSource::parse("https://eosguidehub.com/data/opportunities.json"),
            DatasetSource::Url("https://eosguidehub.com/data/opportunities.json".into())
        );
        assert_eq!(
            DatasetSource::parse("data/opportunities.json"),
            DatasetSource::File(PathBuf::from("data/opportunities.json"))
        );
    }

    #[test]
    fn accepts_bare_array_and_wrapper() {
        let bare = br#"[{"id":"a","title":"A"}, 3, {"id":"b"}]"#;
        let records = parse_dataset(bare, None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text(&["title"]).as_deref(), Some("A"));

        let wrapped = br#"{"opportunities":[{"id":"c"}],"metadata":{"total_count":1}}"#;
        let records = parse_dataset(wrapped, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text(&["id"]).as_deref(), Some("c"));
    }

    #[test]
    fn rejects_unexpected_json_shapes() {
        assert!(matches!(parse_dataset(b"{\"items\":[]}", None), Err(DatasetError::Shape(_))));
        assert!(matches!(
            parse_dataset(b"\"text\"", Some(DatasetFormat::Json)),
            Err(DatasetError::Shape(_))
        ));
        assert!(matches!(parse_dataset(b"[{", None), Err(DatasetError::Json(_))));
    }

    #[test]
    fn csv_rows_become_records() {
        let csv = b"id,title,state,featured,deadline\n1,Grant X,Nationwide,true,\n2, Refund Y ,CA,false,2026-12-01\n";
        let records = parse_dataset(csv, None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].flag(&["featured"]), Some(true));
        assert!(!records[0].contains_key("deadline"));
        assert_eq!(records[1].text(&["title"]).as_deref(), Some("Refund Y"));
    }

    #[test]
    fn file_loading_uses_extension_and_reports_missing_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("opps.csv");
        std::fs::write(&path, "title\n[bracketed title]\n").unwrap();
        let records = load_dataset_file(&path).unwrap();
        assert_eq!(records[0].text(&["title"]).as_deref(), Some("[bracketed title]"));

        let err = load_dataset_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, DatasetError::Io { .. }));
    }

    #[tokio::test]
    async fn async_loader_reads_files_and_surfaces_fetch_failures() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("opportunities.json");
        std::fs::write(&path, r#"[{"title":"A"}]"#).unwrap();

        let fetcher = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap();
        let records = load_dataset(&DatasetSource::File(path), &fetcher).await.unwrap();
        assert_eq!(records.len(), 1);

        let err = load_dataset(&DatasetSource::Url("http://127.0.0.1:9/data.json".into()), &fetcher)
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::Fetch(_)));
    }
}
