//! Core domain model and listing pipeline for eosguide.

use std::borrow::Borrow;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod catalog;
pub mod display;
pub mod filter;
pub mod normalize;
pub mod share;
pub mod sort;

pub use catalog::{Catalog, CatalogError, UrgencyThresholds};
pub use display::{CardView, EmptyState, ListingView, UrgencyTier};
pub use filter::{CategoryFilter, FilterState};
pub use normalize::{days_left, normalize, DAYS_OPEN_ENDED, DAYS_UNKNOWN};
pub use sort::SortProfile;

pub const CRATE_NAME: &str = "eos-core";

/// State value meaning "available everywhere".
pub const NATIONWIDE: &str = "Nationwide";

/// Ids the user bookmarked. Ordered so the persisted form is stable.
pub type SavedSet = BTreeSet<String>;

/// Loosely typed record as it arrives from a JSON dataset, a CSV row or an
/// issue submission. Field names vary between producers; the normalizer
/// resolves the aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// First non-blank value among `keys`, rendered as trimmed text.
    pub fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|key| self.0.get(*key))
            .filter_map(value_as_text)
            .find(|s| !s.is_empty())
    }

    /// First value among `keys` that reads as a boolean.
    pub fn flag(&self, keys: &[&str]) -> Option<bool> {
        keys.iter()
            .filter_map(|key| self.0.get(*key))
            .find_map(value_as_flag)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Claim URL, falling back to the info URL.
    pub fn primary_url(&self) -> Option<String> {
        self.text(&normalize::APPLY_URL_KEYS)
            .or_else(|| self.text(&normalize::INFO_URL_KEYS))
    }

    /// Claim and info URLs, trimmed, blanks dropped.
    pub fn link_urls(&self) -> Vec<String> {
        [&normalize::APPLY_URL_KEYS, &normalize::INFO_URL_KEYS]
            .into_iter()
            .filter_map(|keys| self.text(keys))
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect()
    }

    pub fn title(&self) -> Option<String> {
        self.text(&["title", "name"])
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "[x]" => Some(true),
            "false" | "no" | "n" | "0" | "[ ]" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Canonical opportunity as consumed by the filter, sort and display stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub amount: String,
    pub state: String,
    pub agency: String,
    pub source: String,
    pub deadline: String,
    pub days_left: i64,
    pub date_found: String,
    pub difficulty: String,
    pub value: String,
    pub featured: bool,
    pub proof_required: String,
    pub money_speed: String,
    pub priority_for_user: String,
    pub apply_url: String,
    pub info_url: String,
    /// Index in the loaded dataset; last sort tiebreak.
    pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geography {
    National,
    Regional,
}

impl OpportunityRecord {
    /// Claim link when present, otherwise the info page.
    pub fn primary_url(&self) -> Option<&str> {
        [self.apply_url.as_str(), self.info_url.as_str()]
            .into_iter()
            .find(|u| !u.is_empty())
    }

    pub fn geography(&self) -> Geography {
        if self.state == NATIONWIDE {
            Geography::National
        } else {
            Geography::Regional
        }
    }
}

/// Normalize → filter → sort → project, parameterized by catalog data and
/// sort profile.
#[derive(Debug, Clone, Copy)]
pub struct ListingPipeline<'a> {
    catalog: &'a Catalog,
    profile: SortProfile,
}

impl<'a> ListingPipeline<'a> {
    pub fn new(catalog: &'a Catalog, profile: SortProfile) -> Self {
        Self { catalog, profile }
    }

    pub fn catalog(&self) -> &Catalog {
        self.catalog
    }

    pub fn profile(&self) -> SortProfile {
        self.profile
    }

    pub fn normalize_all(&self, raws: &[RawRecord], today: NaiveDate) -> Vec<OpportunityRecord> {
        raws.iter()
            .enumerate()
            .map(|(position, raw)| normalize(raw, position, today))
            .collect()
    }

    /// Filter and order `records` without projecting them.
    pub fn select<'r>(
        &self,
        records: &'r [OpportunityRecord],
        state: &FilterState,
        saved: &SavedSet,
    ) -> Vec<&'r OpportunityRecord> {
        let mut matched = filter::filter(records, state, saved, self.catalog);
        sort::sort_records(&mut matched, self.catalog, self.profile);
        matched
    }

    pub fn view<R: Borrow<OpportunityRecord>>(
        &self,
        records: &[R],
        state: &FilterState,
        saved: &SavedSet,
    ) -> ListingView {
        let mut matched = filter::filter(
            records.iter().map(<R as Borrow<OpportunityRecord>>::borrow),
            state,
            saved,
            self.catalog,
        );
        sort::sort_records(&mut matched, self.catalog, self.profile);
        display::build_listing(&matched, records.len(), state, saved, self.catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_skips_blank_values_and_renders_scalars() {
        let raw = RawRecord::from_pairs([
            ("url", json!("  ")),
            ("url_claim", json!("https://claim.example")),
            ("amount", json!(125)),
        ]);
        assert_eq!(
            raw.text(&["url", "url_claim"]).as_deref(),
            Some("https://claim.example")
        );
        assert_eq!(raw.text(&["amount"]).as_deref(), Some("125"));
        assert_eq!(raw.text(&["missing"]), None);
    }

    #[test]
    fn flag_reads_booleans_strings_and_numbers() {
        let raw = RawRecord::from_pairs([
            ("a", json!(true)),
            ("b", json!("Yes")),
            ("c", json!(0)),
            ("d", json!("maybe")),
        ]);
        assert_eq!(raw.flag(&["a"]), Some(true));
        assert_eq!(raw.flag(&["b"]), Some(true));
        assert_eq!(raw.flag(&["c"]), Some(false));
        assert_eq!(raw.flag(&["d"]), None);
    }

    #[test]
    fn primary_url_prefers_claim_link() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let both = normalize(
            &RawRecord::from_pairs([
                ("title", "A"),
                ("apply_url", "https://apply"),
                ("details_url", "https://info"),
            ]),
            0,
            today,
        );
        assert_eq!(both.primary_url(), Some("https://apply"));

        let info_only = normalize(
            &RawRecord::from_pairs([("title", "B"), ("url_info", "https://info")]),
            1,
            today,
        );
        assert_eq!(info_only.primary_url(), Some("https://info"));

        let none = normalize(&RawRecord::from_pairs([("title", "C")]), 2, today);
        assert_eq!(none.primary_url(), None);

        let raw = RawRecord::from_pairs([("name", "D"), ("detailsUrl", "https://d")]);
        assert_eq!(raw.primary_url().as_deref(), Some("https://d"));
        assert_eq!(raw.title().as_deref(), Some("D"));
    }

    #[test]
    fn link_urls_lists_claim_and_info() {
        let raw = RawRecord::from_pairs([("apply_url", " https://apply "), ("details_url", "https://info")]);
        assert_eq!(raw.link_urls(), vec!["https://apply", "https://info"]);
        assert!(RawRecord::from_pairs([("url", "  ")]).link_urls().is_empty());
    }
}
