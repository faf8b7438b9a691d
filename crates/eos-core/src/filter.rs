//! Compound filter predicate over canonical records.

use serde::{Deserialize, Serialize};

use crate::{Catalog, Geography, OpportunityRecord, SavedSet, NATIONWIDE};

/// Current selections. Empty string means "no selection" for every field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    #[serde(alias = "q")]
    pub query: String,
    pub category: String,
    pub state: String,
    pub speed: String,
    pub difficulty: String,
    pub proof: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryFilter<'a> {
    All,
    Saved,
    Ending,
    National,
    Exact(&'a str),
}

impl<'a> CategoryFilter<'a> {
    pub fn parse(selection: &'a str) -> Self {
        let trimmed = selection.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "all" => Self::All,
            "saved" => Self::Saved,
            "ending" => Self::Ending,
            "national" | "nationwide" => Self::National,
            _ => Self::Exact(trimmed),
        }
    }
}

impl FilterState {
    /// Collapse UI "All" selections of the plain facets to the empty sentinel
    /// and trim everything. Category keeps its own sentinels.
    pub fn normalized(mut self) -> Self {
        fn unset_all(value: &mut String) {
            let trimmed = value.trim();
            *value = if trimmed.eq_ignore_ascii_case("all") {
                String::new()
            } else {
                trimmed.to_string()
            };
        }
        self.query = self.query.trim().to_string();
        self.category = self.category.trim().to_string();
        unset_all(&mut self.state);
        unset_all(&mut self.speed);
        unset_all(&mut self.difficulty);
        unset_all(&mut self.proof);
        self
    }

    pub fn category_filter(&self) -> CategoryFilter<'_> {
        CategoryFilter::parse(&self.category)
    }

    pub fn is_empty(&self) -> bool {
        self.query.trim().is_empty()
            && self.category_filter() == CategoryFilter::All
            && state_unset(&self.state)
            && self.speed.is_empty()
            && self.difficulty.is_empty()
            && self.proof.is_empty()
    }
}

fn state_unset(selection: &str) -> bool {
    let trimmed = selection.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all")
}

pub fn matches_state(record: &OpportunityRecord, selection: &str, catalog: &Catalog) -> bool {
    if state_unset(selection) {
        return true;
    }
    let selection = selection.trim();
    record.state == selection
        || catalog
            .state_full_name(selection)
            .is_some_and(|full| record.state == full)
        || record.state == NATIONWIDE
}

pub fn matches_category(
    record: &OpportunityRecord,
    category: CategoryFilter<'_>,
    saved: &SavedSet,
    catalog: &Catalog,
) -> bool {
    match category {
        CategoryFilter::All => true,
        CategoryFilter::Saved => saved.contains(&record.id),
        CategoryFilter::Ending => record.days_left > 0 && record.days_left < catalog.ending_window_days,
        CategoryFilter::National => record.geography() == Geography::National,
        CategoryFilter::Exact(label) => record.category == label,
    }
}

pub fn matches_query(record: &OpportunityRecord, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    let haystack = format!(
        "{} {} {}",
        record.title, record.description, record.agency
    )
    .to_lowercase();
    haystack.contains(&needle)
}

fn matches_facet(value: &str, selection: &str) -> bool {
    selection.is_empty() || value == selection
}

pub fn matches(
    record: &OpportunityRecord,
    state: &FilterState,
    saved: &SavedSet,
    catalog: &Catalog,
) -> bool {
    matches_state(record, &state.state, catalog)
        && matches_category(record, state.category_filter(), saved, catalog)
        && matches_query(record, &state.query)
        && matches_facet(&record.money_speed, &state.speed)
        && matches_facet(&record.difficulty, &state.difficulty)
        && matches_facet(&record.proof_required, &state.proof)
}

/// Records satisfying every criterion, in input order.
pub fn filter<'r, I>(
    records: I,
    state: &FilterState,
    saved: &SavedSet,
    catalog: &Catalog,
) -> Vec<&'r OpportunityRecord>
where
    I: IntoIterator<Item = &'r OpportunityRecord>,
{
    records
        .into_iter()
        .filter(|record| matches(record, state, saved, catalog))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{normalize, RawRecord};
    use chrono::NaiveDate;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    fn record(pairs: &[(&str, serde_json::Value)], position: usize) -> OpportunityRecord {
        let raw = RawRecord::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())));
        normalize(&raw, position, today())
    }

    fn dataset() -> Vec<OpportunityRecord> {
        vec![
            record(
                &[
                    ("id", json!("a")),
                    ("title", json!("Grant X")),
                    ("state", json!("Nationwide")),
                    ("category", json!("Grants")),
                    ("moneySpeed", json!("Fast")),
                ],
                0,
            ),
            record(
                &[
                    ("id", json!("b")),
                    ("title", json!("Refund Y")),
                    ("state", json!("CA")),
                    ("deadline", json!("2026-01-20")),
                    ("category", json!("Unclaimed money & refunds")),
                    ("difficulty", json!("Easy")),
                ],
                1,
            ),
            record(
                &[
                    ("id", json!("c")),
                    ("title", json!("Texas Utility Credit")),
                    ("state", json!("Texas")),
                    ("agency", json!("Lone Star Power")),
                    ("deadline", json!("2026-04-01")),
                    ("proofRequired", json!(true)),
                ],
                2,
            ),
        ]
    }

    fn ids(records: &[&OpportunityRecord]) -> Vec<String> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn empty_filter_keeps_everything_in_order() {
        let data = dataset();
        let out = filter(&data, &FilterState::default(), &SavedSet::new(), &Catalog::default());
        assert_eq!(ids(&out), vec!["a", "b", "c"]);
    }

    #[test]
    fn state_matches_code_full_name_and_nationwide() {
        let data = dataset();
        let catalog = Catalog::default();
        let tx = FilterState { state: "TX".into(), ..Default::default() };
        assert_eq!(ids(&filter(&data, &tx, &SavedSet::new(), &catalog)), vec!["a", "c"]);

        let ca = FilterState { state: "CA".into(), ..Default::default() };
        assert_eq!(ids(&filter(&data, &ca, &SavedSet::new(), &catalog)), vec!["a", "b"]);
    }

    #[test]
    fn nationwide_selection_returns_only_nationwide_records() {
        let data = dataset();
        let state = FilterState { state: "Nationwide".into(), ..Default::default() };
        let out = filter(&data, &state, &SavedSet::new(), &Catalog::default());
        assert_eq!(ids(&out), vec!["a"]);
        assert!(out.iter().all(|r| r.state == "Nationwide"));
    }

    #[test]
    fn saved_category_returns_exactly_saved_ids() {
        let data = dataset();
        let catalog = Catalog::default();
        let state = FilterState { category: "saved".into(), ..Default::default() };
        assert!(filter(&data, &state, &SavedSet::new(), &catalog).is_empty());

        let saved: SavedSet = ["c".to_string(), "zzz".to_string()].into_iter().collect();
        assert_eq!(ids(&filter(&data, &state, &saved, &catalog)), vec!["c"]);
    }

    #[test]
    fn ending_category_uses_open_window() {
        let data = dataset();
        let state = FilterState { category: "ending".into(), ..Default::default() };
        let out = filter(&data, &state, &SavedSet::new(), &Catalog::default());
        assert_eq!(ids(&out), vec!["b"]);
    }

    #[test]
    fn national_and_exact_categories() {
        let data = dataset();
        let catalog = Catalog::default();
        let national = FilterState { category: "national".into(), ..Default::default() };
        assert_eq!(ids(&filter(&data, &national, &SavedSet::new(), &catalog)), vec!["a"]);

        let other = FilterState { category: "Other".into(), ..Default::default() };
        assert_eq!(ids(&filter(&data, &other, &SavedSet::new(), &catalog)), vec!["c"]);
    }

    #[test]
    fn query_is_case_insensitive_and_covers_agency() {
        let data = dataset();
        let catalog = Catalog::default();
        let grant = FilterState { query: "Grant".into(), ..Default::default() };
        assert_eq!(ids(&filter(&data, &grant, &SavedSet::new(), &catalog)), vec!["a"]);

        let agency = FilterState { query: "lone STAR".into(), ..Default::default() };
        assert_eq!(ids(&filter(&data, &agency, &SavedSet::new(), &catalog)), vec!["c"]);
    }

    #[test]
    fn facets_are_exact_and_absent_fields_never_match() {
        let data = dataset();
        let catalog = Catalog::default();
        let fast = FilterState { speed: "Fast".into(), ..Default::default() };
        assert_eq!(ids(&filter(&data, &fast, &SavedSet::new(), &catalog)), vec!["a"]);

        let easy = FilterState { difficulty: "Easy".into(), ..Default::default() };
        assert_eq!(ids(&filter(&data, &easy, &SavedSet::new(), &catalog)), vec!["b"]);

        let proof = FilterState { proof: "Yes".into(), ..Default::default() };
        assert_eq!(ids(&filter(&data, &proof, &SavedSet::new(), &catalog)), vec!["c"]);
    }

    #[test]
    fn filtering_is_idempotent() {
        let data = dataset();
        let catalog = Catalog::default();
        let state = FilterState { state: "TX".into(), query: "t".into(), ..Default::default() };
        let once = filter(&data, &state, &SavedSet::new(), &catalog);
        let twice = filter(once.iter().copied(), &state, &SavedSet::new(), &catalog);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalized_maps_all_to_unset() {
        let state = FilterState {
            query: "  grant ".into(),
            state: "All".into(),
            speed: "ALL".into(),
            category: " saved ".into(),
            ..Default::default()
        }
        .normalized();
        assert_eq!(state.query, "grant");
        assert_eq!(state.state, "");
        assert_eq!(state.speed, "");
        assert_eq!(state.category_filter(), CategoryFilter::Saved);
        assert!(!state.is_empty());
        assert!(FilterState::default().is_empty());
    }
}
