//! Static homepage: the first cards rendered into `index.html` so the page
//! shows content before any script runs.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use askama::Template;
use chrono::NaiveDate;
use eos_core::display::deadline_label;
use eos_core::normalize::parse_calendar_date;
use eos_core::{normalize, OpportunityRecord, RawRecord};
use eos_storage::{parse_dataset, write_atomic, DatasetFormat};
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::info;

pub const START_MARKER: &str = "<!-- OPPORTUNITIES:START -->";
pub const END_MARKER: &str = "<!-- OPPORTUNITIES:END -->";
pub const HOMEPAGE_CARD_LIMIT: usize = 60;

static OPP_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(<span[^>]+id="oppCount"[^>]*>)[^<]*(</span>)"#).unwrap());

#[derive(Debug, Error)]
pub enum PrerenderError {
    #[error("homepage is missing the OPPORTUNITIES:START / OPPORTUNITIES:END markers")]
    MissingMarkers,
    #[error("rendering homepage cards: {0}")]
    Render(#[from] askama::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomepageCard {
    pub title: String,
    pub description: String,
    pub category: String,
    pub state: String,
    pub amount: String,
    pub deadline: String,
    pub link: String,
}

/// Homepage link for a record. Links into this site become root-relative and
/// article links always end in `.html`; other sites are left as they are.
pub fn card_link(url: &str, site_url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return "#".to_string();
    }
    let site = site_url.trim().trim_end_matches('/');
    let local = match url.strip_prefix(site) {
        Some(rest) if !site.is_empty() && (rest.is_empty() || rest.starts_with(['/', '?', '#'])) => rest,
        _ => url,
    };
    if local.contains("://") || local.starts_with("mailto:") || local.starts_with('#') {
        return local.to_string();
    }

    let mut link = if local.starts_with('/') {
        local.to_string()
    } else {
        format!("/{local}")
    };
    if let Some(slug) = link.strip_prefix("/articles/") {
        let slug = slug.trim_end_matches('/');
        if !slug.is_empty() && !slug.contains(['?', '#']) && !slug.ends_with(".html") {
            link = format!("/articles/{slug}.html");
        }
    }
    link
}

impl HomepageCard {
    fn from_record(record: &OpportunityRecord, site_url: &str) -> Self {
        Self {
            title: record.title.clone(),
            description: record.description.clone(),
            category: record.category.clone(),
            state: record.state.clone(),
            amount: if record.amount.is_empty() {
                "Varies".to_string()
            } else {
                record.amount.clone()
            },
            deadline: deadline_label(&record.deadline),
            link: card_link(record.primary_url().unwrap_or_default(), site_url),
        }
    }
}

#[derive(Template)]
#[template(path = "homepage_cards.html")]
struct HomepageCardsTemplate {
    cards: Vec<HomepageCard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrerenderSummary {
    pub rendered: usize,
    pub total: usize,
}

/// Featured first, then soonest calendar deadline (no date sorts last), then title.
pub fn homepage_order(records: &[OpportunityRecord], today: NaiveDate) -> Vec<&OpportunityRecord> {
    let mut ordered: Vec<&OpportunityRecord> = records.iter().collect();
    ordered.sort_by_cached_key(|record| {
        let days = parse_calendar_date(&record.deadline)
            .map(|date| (date - today).num_days())
            .unwrap_or(i64::MAX);
        (!record.featured, days, record.title.trim().to_lowercase())
    });
    ordered
}

/// Replace everything between the markers and refresh the `oppCount` span.
pub fn splice_cards(page: &str, cards_html: &str, total: usize) -> Result<String, PrerenderError> {
    let start = page.find(START_MARKER).ok_or(PrerenderError::MissingMarkers)?;
    let body_start = start + START_MARKER.len();
    let end = page[body_start..]
        .find(END_MARKER)
        .map(|offset| body_start + offset)
        .ok_or(PrerenderError::MissingMarkers)?;

    let mut out = String::with_capacity(page.len() + cards_html.len());
    out.push_str(&page[..body_start]);
    out.push('\n');
    out.push_str(cards_html.trim());
    out.push('\n');
    out.push_str(&page[end..]);

    let counted = OPP_COUNT.replacen(&out, 1, |caps: &Captures| format!("{}({total}){}", &caps[1], &caps[2]));
    Ok(counted.into_owned())
}

pub fn prerender_page(
    page: &str,
    raws: &[RawRecord],
    today: NaiveDate,
    site_url: &str,
) -> Result<(String, PrerenderSummary), PrerenderError> {
    let records: Vec<OpportunityRecord> = raws
        .iter()
        .enumerate()
        .map(|(position, raw)| normalize(raw, position, today))
        .collect();
    let cards: Vec<HomepageCard> = homepage_order(&records, today)
        .into_iter()
        .take(HOMEPAGE_CARD_LIMIT)
        .map(|record| HomepageCard::from_record(record, site_url))
        .collect();
    let summary = PrerenderSummary {
        rendered: cards.len(),
        total: records.len(),
    };
    let html = HomepageCardsTemplate { cards }.render()?;
    Ok((splice_cards(page, &html, summary.total)?, summary))
}

pub async fn prerender_homepage(
    index_path: &Path,
    data_path: &Path,
    today: NaiveDate,
    site_url: &str,
) -> anyhow::Result<PrerenderSummary> {
    let bytes = tokio::fs::read(data_path)
        .await
        .with_context(|| format!("reading {}", data_path.display()))?;
    let format = data_path.to_str().and_then(DatasetFormat::from_extension);
    let raws = parse_dataset(&bytes, format).with_context(|| format!("parsing {}", data_path.display()))?;

    let page = tokio::fs::read_to_string(index_path)
        .await
        .with_context(|| format!("reading {}", index_path.display()))?;
    let (rendered, summary) =
        prerender_page(&page, &raws, today, site_url).with_context(|| format!("pre-rendering {}", index_path.display()))?;
    write_atomic(index_path, rendered.as_bytes()).await?;

    info!(rendered = summary.rendered, total = summary.total, "homepage pre-rendered");
    Ok(summary)
}
