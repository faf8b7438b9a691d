use std::collections::HashSet;

use eos_core::RawRecord;
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use tracing::{info, warn};

pub trait DedupHook: Send + Sync {
    fn apply(&self, records: Vec<RawRecord>) -> Vec<RawRecord>;
}

#[derive(Default)]
pub struct NoopDedupHook;

impl DedupHook for NoopDedupHook {
    fn apply(&self, records: Vec<RawRecord>) -> Vec<RawRecord> {
        records
    }
}

/// Two titles this similar are reported for a human to look at; they are
/// not merged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DedupReviewItem {
    pub title_a: String,
    pub title_b: String,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupReport {
    pub removed: usize,
    pub review_items: Vec<DedupReviewItem>,
}

#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    pub review_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            review_threshold: 0.92,
        }
    }
}

pub struct DedupEngine {
    config: DedupConfig,
}

impl DedupEngine {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn normalize_key_fragment(input: &str) -> String {
        input
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Lowercased, trimmed title: equal keys mean the same opportunity.
    pub fn title_key(record: &RawRecord) -> Option<String> {
        record.title().map(|title| title.trim().to_lowercase())
    }

    pub fn similarity(a: &str, b: &str) -> f64 {
        jaro_winkler(&Self::normalize_key_fragment(a), &Self::normalize_key_fragment(b))
    }

    /// Keep the first record per title key, then flag near-identical titles.
    pub fn dedup(&self, records: Vec<RawRecord>) -> (Vec<RawRecord>, DedupReport) {
        let before = records.len();
        let mut seen = HashSet::new();
        let unique: Vec<RawRecord> = records
            .into_iter()
            .filter(|record| match Self::title_key(record) {
                Some(key) => seen.insert(key),
                None => true,
            })
            .collect();

        let titles: Vec<String> = unique.iter().map(|r| r.title().unwrap_or_default()).collect();
        let mut review_items = Vec::new();
        for i in 0..titles.len() {
            for j in (i + 1)..titles.len() {
                if titles[i].is_empty() || titles[j].is_empty() {
                    continue;
                }
                let score = Self::similarity(&titles[i], &titles[j]);
                if score >= self.config.review_threshold {
                    review_items.push(DedupReviewItem {
                        title_a: titles[i].clone(),
                        title_b: titles[j].clone(),
                        confidence_score: score,
                    });
                }
            }
        }

        let report = DedupReport {
            removed: before - unique.len(),
            review_items,
        };
        (unique, report)
    }
}

impl Default for DedupEngine {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

impl DedupHook for DedupEngine {
    fn apply(&self, records: Vec<RawRecord>) -> Vec<RawRecord> {
        let (records, report) = self.dedup(records);
        if report.removed > 0 {
            info!(removed = report.removed, "dropped duplicate titles");
        }
        for item in &report.review_items {
            warn!(
                a = %item.title_a,
                b = %item.title_b,
                score = item.confidence_score,
                "possible duplicate needs review"
            );
        }
        records
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateMatch {
    Id,
    Url,
}

/// How a candidate collides with the existing dataset, if it does. Every
/// claim and info URL on either side is compared.
pub fn find_duplicate(existing: &[RawRecord], id: Option<&str>, urls: &[String]) -> Option<DuplicateMatch> {
    let id = id.map(str::trim).filter(|id| !id.is_empty());
    let urls: Vec<&str> = urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()).collect();
    for record in existing {
        if id.is_some() && record.text(&["id"]).as_deref() == id {
            return Some(DuplicateMatch::Id);
        }
        if !urls.is_empty() && record.link_urls().iter().any(|known| urls.contains(&known.as_str())) {
            return Some(DuplicateMatch::Url);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn titled(title: &str) -> RawRecord {
        RawRecord::from_pairs([("title", json!(title))])
    }

    #[test]
    fn keeps_first_record_per_lowercase_title() {
        let records = vec![
            titled("Acme Refund"),
            titled("  acme refund "),
            titled("Globex Recall"),
            RawRecord::new(),
        ];
        let (kept, report) = DedupEngine::default().dedup(records);
        assert_eq!(kept.len(), 3);
        assert_eq!(report.removed, 1);
        assert_eq!(kept[0].title().as_deref(), Some("Acme Refund"));
    }

    #[test]
    fn near_duplicates_are_flagged_not_removed() {
        let records = vec![
            titled("Recall: Glowline Infant Stroller"),
            titled("Recall: Glowline Infant Strollers"),
            titled("FTC: Initech refunds"),
        ];
        let (kept, report) = DedupEngine::default().dedup(records);
        assert_eq!(kept.len(), 3);
        assert_eq!(report.review_items.len(), 1);
        assert!(report.review_items[0].confidence_score > 0.92);
    }

    #[test]
    fn finds_duplicates_by_id_or_url() {
        let existing = vec![RawRecord::from_pairs([
            ("id", json!("abc")),
            ("title", json!("A")),
            ("url", json!("https://a.test/claim")),
        ])];
        let urls = |u: &str| vec![u.to_string()];
        assert_eq!(find_duplicate(&existing, Some("abc"), &[]), Some(DuplicateMatch::Id));
        assert_eq!(
            find_duplicate(&existing, Some("zzz"), &urls("https://a.test/claim")),
            Some(DuplicateMatch::Url)
        );
        assert_eq!(find_duplicate(&existing, Some("zzz"), &urls("https://b.test")), None);
        assert_eq!(find_duplicate(&existing, Some("zzz"), &urls("  ")), None);
        assert_eq!(find_duplicate(&existing, None, &[]), None);
    }

    #[test]
    fn info_url_of_an_existing_record_counts() {
        let existing = vec![RawRecord::from_pairs([
            ("id", json!("abc")),
            ("apply_url", json!("https://a.test/claim")),
            ("details_url", json!("https://a.test/about")),
        ])];
        assert_eq!(
            find_duplicate(&existing, Some("new"), &["https://a.test/about".to_string()]),
            Some(DuplicateMatch::Url)
        );
        assert_eq!(
            find_duplicate(&existing, None, &["https://x.test".to_string(), "https://a.test/claim".to_string()]),
            Some(DuplicateMatch::Url)
        );
    }
}
