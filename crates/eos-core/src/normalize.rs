//! Raw record → canonical [`OpportunityRecord`]. Total: every input yields a
//! record, bad fields fall back to defaults and bad dates to sentinels.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::{OpportunityRecord, RawRecord, NATIONWIDE};

/// `days_left` for a missing or unparseable deadline.
pub const DAYS_UNKNOWN: i64 = -1;
/// `days_left` for an explicitly open-ended deadline.
pub const DAYS_OPEN_ENDED: i64 = 999;

pub const DEFAULT_CATEGORY: &str = "Other";
pub const DEFAULT_DIFFICULTY: &str = "Medium";

const OPEN_ENDED_EXACT: [&str; 4] = ["ongoing", "none", "n/a", "na"];
const OPEN_ENDED_CONTAINS: [&str; 3] = ["rolling", "varies", "tbd"];

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y", "%Y/%m/%d"];

pub(crate) const APPLY_URL_KEYS: [&str; 4] = ["apply_url", "url_claim", "claim_url", "url"];
pub(crate) const INFO_URL_KEYS: [&str; 4] = ["details_url", "url_info", "detailsUrl", "info_url"];

pub fn normalize(raw: &RawRecord, position: usize, today: NaiveDate) -> OpportunityRecord {
    let title = raw.text(&["title", "name"]).unwrap_or_default();
    let deadline = raw.text(&["deadline"]).unwrap_or_default();
    let id = raw.text(&["id"]).unwrap_or_else(|| title.clone());

    OpportunityRecord {
        id,
        description: raw.text(&["description"]).unwrap_or_default(),
        category: raw
            .text(&["category"])
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        amount: raw.text(&["amount"]).unwrap_or_default(),
        state: raw.text(&["state"]).unwrap_or_else(|| NATIONWIDE.to_string()),
        agency: raw.text(&["agency", "company", "defendant"]).unwrap_or_default(),
        source: raw.text(&["source"]).unwrap_or_default(),
        days_left: days_left(&deadline, today),
        deadline,
        date_found: raw.text(&["date_found", "dateFound"]).unwrap_or_default(),
        difficulty: raw
            .text(&["difficulty"])
            .unwrap_or_else(|| DEFAULT_DIFFICULTY.to_string()),
        value: raw.text(&["value"]).unwrap_or_default(),
        featured: raw.flag(&["featured"]).unwrap_or(false),
        proof_required: proof_text(raw),
        money_speed: raw
            .text(&["moneySpeed", "money_speed", "speed"])
            .unwrap_or_default(),
        priority_for_user: raw
            .text(&["priorityForUser", "priority_for_user", "priority"])
            .unwrap_or_default(),
        apply_url: raw.text(&APPLY_URL_KEYS).unwrap_or_default(),
        info_url: raw.text(&INFO_URL_KEYS).unwrap_or_default(),
        title,
        position,
    }
}

// Booleans become the Yes/No labels the proof facet offers.
fn proof_text(raw: &RawRecord) -> String {
    for key in ["proofRequired", "proof_required", "proof"] {
        match raw.get(key) {
            Some(Value::Bool(true)) => return "Yes".to_string(),
            Some(Value::Bool(false)) => return "No".to_string(),
            _ => {}
        }
    }
    raw.text(&["proofRequired", "proof_required", "proof"])
        .unwrap_or_default()
}

/// Whole days from `today` to `deadline`, or a sentinel.
pub fn days_left(deadline: &str, today: NaiveDate) -> i64 {
    let trimmed = deadline.trim();
    if trimmed.is_empty() {
        return DAYS_UNKNOWN;
    }
    if is_open_ended(trimmed) {
        return DAYS_OPEN_ENDED;
    }
    match parse_calendar_date(trimmed) {
        Some(date) => (date - today).num_days(),
        None => DAYS_UNKNOWN,
    }
}

pub fn is_open_ended(deadline: &str) -> bool {
    let lower = deadline.trim().to_lowercase();
    OPEN_ENDED_EXACT.contains(&lower.as_str())
        || OPEN_ENDED_CONTAINS.iter().any(|token| lower.contains(token))
}

/// ISO dates, RFC 3339 timestamps, `M/D/YYYY` and `Month D, YYYY`.
pub fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Some(date);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(ts.date());
        }
    }
    None
}
