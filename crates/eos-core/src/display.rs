//! Display model: what a card shows, independent of the template engine.

use std::borrow::Borrow;

use serde::Serialize;

use crate::filter::{CategoryFilter, FilterState};
use crate::normalize::parse_calendar_date;
use crate::{Catalog, OpportunityRecord, SavedSet, UrgencyThresholds};

pub const NO_DEADLINE: &str = "No deadline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyTier {
    Urgent,
    Warning,
    Notice,
}

impl UrgencyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::Warning => "warning",
            Self::Notice => "notice",
        }
    }
}

pub fn urgency_tier(days_left: i64, thresholds: &UrgencyThresholds) -> Option<UrgencyTier> {
    if !(0..=thresholds.max_days).contains(&days_left) {
        return None;
    }
    if days_left <= thresholds.urgent {
        Some(UrgencyTier::Urgent)
    } else if days_left <= thresholds.warning {
        Some(UrgencyTier::Warning)
    } else if days_left <= thresholds.notice {
        Some(UrgencyTier::Notice)
    } else {
        None
    }
}

pub fn days_left_label(days_left: i64, thresholds: &UrgencyThresholds) -> Option<String> {
    match days_left {
        d if !(0..=thresholds.max_days).contains(&d) => None,
        0 => Some("Ends today".to_string()),
        1 => Some("1 day left".to_string()),
        d => Some(format!("{d} days left")),
    }
}

/// Featured wins over the value rating.
pub fn value_badge(record: &OpportunityRecord) -> Option<String> {
    if record.featured {
        return Some("Featured".to_string());
    }
    match record.value.trim().to_ascii_lowercase().as_str() {
        "" => None,
        "excellent" => Some("Excellent value".to_string()),
        "good" => Some("Good value".to_string()),
        "fair" => Some("Fair value".to_string()),
        other => {
            let mut chars = other.chars();
            chars
                .next()
                .map(|first| format!("{}{} value", first.to_uppercase(), chars.as_str()))
        }
    }
}

/// `Mar 5, 2026`, `No deadline`, or the stored text when it is not a date.
pub fn deadline_label(deadline: &str) -> String {
    let trimmed = deadline.trim();
    if trimmed.is_empty() {
        return NO_DEADLINE.to_string();
    }
    match parse_calendar_date(trimmed) {
        Some(date) => date.format("%b %-d, %Y").to_string(),
        None => trimmed.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub amount: String,
    pub state: String,
    pub agency: String,
    pub deadline_label: String,
    pub days_left: i64,
    pub days_left_label: Option<String>,
    pub urgency: Option<UrgencyTier>,
    pub badge: Option<String>,
    pub link: Option<String>,
    pub info_link: Option<String>,
    pub difficulty: String,
    pub money_speed: String,
    pub proof_required: String,
    pub featured: bool,
    pub saved: bool,
}

pub fn build_card(record: &OpportunityRecord, saved: &SavedSet, catalog: &Catalog) -> CardView {
    let link = record.primary_url().map(str::to_string);
    let info_link = Some(record.info_url.clone())
        .filter(|u| !u.is_empty() && link.as_deref() != Some(u.as_str()));
    CardView {
        id: record.id.clone(),
        title: record.title.clone(),
        description: record.description.clone(),
        category: record.category.clone(),
        amount: record.amount.clone(),
        state: record.state.clone(),
        agency: record.agency.clone(),
        deadline_label: deadline_label(&record.deadline),
        days_left: record.days_left,
        days_left_label: days_left_label(record.days_left, &catalog.urgency),
        urgency: urgency_tier(record.days_left, &catalog.urgency),
        badge: value_badge(record),
        link,
        info_link,
        difficulty: record.difficulty.clone(),
        money_speed: record.money_speed.clone(),
        proof_required: record.proof_required.clone(),
        featured: record.featured,
        saved: saved.contains(&record.id),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyState {
    NoSaved,
    NoMatches,
}

impl EmptyState {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoSaved => "You haven't saved anything yet. Tap the bookmark on any opportunity to keep it here.",
            Self::NoMatches => "No opportunities match these filters. Try clearing the search or picking another state.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingView {
    pub cards: Vec<CardView>,
    /// Records passing the filters.
    pub count: usize,
    /// Records in the dataset.
    pub total: usize,
    pub empty: Option<EmptyState>,
}

impl ListingView {
    pub fn count_label(&self) -> String {
        match self.count {
            1 => "1 opportunity".to_string(),
            n => format!("{n} opportunities"),
        }
    }
}

pub fn build_listing<R: Borrow<OpportunityRecord>>(
    sorted: &[R],
    total: usize,
    state: &FilterState,
    saved: &SavedSet,
    catalog: &Catalog,
) -> ListingView {
    let cards = sorted
        .iter()
        .map(|r| build_card(Borrow::<OpportunityRecord>::borrow(r), saved, catalog))
        .collect::<Vec<_>>();
    let empty = if !cards.is_empty() {
        None
    } else if state.category_filter() == CategoryFilter::Saved && saved.is_empty() {
        Some(EmptyState::NoSaved)
    } else {
        Some(EmptyState::NoMatches)
    };
    ListingView {
        count: cards.len(),
        total,
        cards,
        empty,
    }
}
