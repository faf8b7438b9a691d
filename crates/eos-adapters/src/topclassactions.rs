//! Open class action settlements from topclassactions.com.
//!
//! The listing pages only link to settlements; each record comes from the
//! settlement's own page.

use std::sync::LazyLock;

use eos_core::RawRecord;
use regex::Regex;

use crate::html::{absolutize, document_text, element_text, first_amount, first_text, selector};
use crate::{AdapterError, DetailTarget, FetchedPage, ListingParse, ListingTarget, ScrapedOpportunity, SourceAdapter};

pub const SOURCE_ID: &str = "topclassactions";
pub const LISTING_URL: &str =
    "https://topclassactions.com/category/lawsuit-settlements/open-lawsuit-settlements/";

const MAX_LISTING_PAGES: usize = 5;
const SETTLEMENTS_PER_PAGE: usize = 20;
const DESCRIPTION: &str =
    "Class action settlement. Visit official site for full eligibility details.";
const CLAIM_HOSTS: [&str; 2] = ["settlement.com", "claims.com"];
const CLAIM_WORDS: [&str; 5] = ["claim", "file", "submit", "here", "visit"];

static DEADLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:deadline|file by)[:\s]+(\d{1,2}/\d{1,2}/\d{4})").unwrap()
});

#[derive(Debug, Clone, Copy, Default)]
pub struct TopClassActions;

/// Official claim site linked from a settlement page, if any.
fn claim_url(page: &FetchedPage, document: &scraper::Html) -> Result<Option<String>, AdapterError> {
    let links = selector("a[href]")?;
    for link in document.select(&links) {
        let href = link.value().attr("href").unwrap_or_default();
        let href_lower = href.to_lowercase();
        if href_lower.contains("topclassactions.com") {
            continue;
        }
        if !CLAIM_HOSTS.iter().any(|host| href_lower.contains(host)) {
            continue;
        }
        let text = element_text(link).to_lowercase();
        if CLAIM_WORDS.iter().any(|word| text.contains(word)) {
            return Ok(Some(absolutize(&page.url, href)));
        }
    }
    Ok(None)
}

impl SourceAdapter for TopClassActions {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn display_name(&self) -> &'static str {
        "Top Class Actions"
    }

    fn listing_targets(&self, max_items: usize) -> Vec<ListingTarget> {
        let pages = MAX_LISTING_PAGES.min(max_items / SETTLEMENTS_PER_PAGE + 1);
        (1..=pages)
            .map(|page| ListingTarget {
                url: if page == 1 {
                    LISTING_URL.to_string()
                } else {
                    format!("{LISTING_URL}page/{page}/")
                },
            })
            .collect()
    }

    fn parse_listing(&self, page: &FetchedPage, max_items: usize) -> Result<ListingParse, AdapterError> {
        let document = page.document();
        let articles = selector("article")?;
        let links = selector("a[href]")?;

        let mut details: Vec<DetailTarget> = Vec::new();
        for article in document.select(&articles) {
            let Some(href) = article
                .select(&links)
                .next()
                .and_then(|a| a.value().attr("href"))
            else {
                continue;
            };
            if !href.contains("/lawsuit-settlements/") {
                continue;
            }
            let target = DetailTarget {
                url: absolutize(&page.url, href),
            };
            if !details.contains(&target) {
                details.push(target);
            }
            if details.len() >= max_items {
                break;
            }
        }

        Ok(ListingParse {
            records: Vec::new(),
            details,
        })
    }

    fn parse_detail(&self, page: &FetchedPage) -> Result<Option<RawRecord>, AdapterError> {
        let document = page.document();
        let heading = selector("h1")?;
        let title = first_text(document.root_element(), &heading).unwrap_or_else(|| "Unknown".to_string());
        let text = document_text(&document);

        let deadline = DEADLINE
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
        let amount = first_amount(&text);
        let claim = claim_url(page, &document)?;

        Ok(Some(
            ScrapedOpportunity {
                title,
                category: "Class action settlements".to_string(),
                amount: amount.unwrap_or_else(|| "Varies".to_string()),
                deadline: deadline.unwrap_or_else(|| "TBD".to_string()),
                difficulty: "Medium".to_string(),
                description: DESCRIPTION.to_string(),
                claim_url: claim.unwrap_or_else(|| page.url.clone()),
                details_url: page.url.clone(),
                value: "fair".to_string(),
                source: "topclassactions.com".to_string(),
            }
            .into_record(),
        ))
    }
}
