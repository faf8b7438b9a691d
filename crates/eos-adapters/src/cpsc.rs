//! CPSC product recalls (`cpsc.gov/Recalls`).

use std::sync::LazyLock;

use regex::Regex;

use crate::html::{absolutize, first_href, first_text, listing_sections, selector, truncate_description};
use crate::{AdapterError, FetchedPage, ListingParse, ListingTarget, ScrapedOpportunity, SourceAdapter};

pub const SOURCE_ID: &str = "cpsc-recalls";
pub const LISTING_URL: &str = "https://www.cpsc.gov/Recalls";

const DEFAULT_DESCRIPTION: &str =
    "Product recall. Check if you own this item and file for refund/replacement.";

static SECTION_CLASS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)recall|product").unwrap());
static RECALL_HREF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/Recalls/\d{4}/").unwrap());

/// Keyword table checked in order; the first hit wins.
const PRODUCT_CATEGORIES: [(&str, &[&str]); 4] = [
    ("Consumer Products", &["toy", "furniture", "appliance", "mattress", "clothing", "bedding"]),
    ("Technology", &["charger", "battery", "electric", "electronic", "device", "phone"]),
    ("Health & Safety", &["baby", "child", "infant", "stroller", "crib", "seat"]),
    ("Home & Garden", &["ladder", "tool", "heater", "fan", "light", "candle"]),
];

pub fn categorize_product(title: &str) -> &'static str {
    let lower = title.to_lowercase();
    PRODUCT_CATEGORIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or("Consumer Products")
}

pub fn remedy_for(description: &str) -> &'static str {
    let lower = description.to_lowercase();
    if lower.contains("refund") {
        "Full refund available"
    } else if lower.contains("replacement") {
        "Free replacement available"
    } else {
        "Refund or replacement available"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CpscRecalls;

impl SourceAdapter for CpscRecalls {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn display_name(&self) -> &'static str {
        "CPSC Recalls"
    }

    fn listing_targets(&self, _max_items: usize) -> Vec<ListingTarget> {
        vec![ListingTarget {
            url: LISTING_URL.to_string(),
        }]
    }

    fn parse_listing(&self, page: &FetchedPage, max_items: usize) -> Result<ListingParse, AdapterError> {
        let document = page.document();
        let heading = selector("h2, h3, h4, a")?;
        let paragraph = selector("p")?;

        let mut records = Vec::new();
        for item in listing_sections(&document, &SECTION_CLASS, &RECALL_HREF, max_items)? {
            let Some(title) = first_text(item, &heading) else {
                continue;
            };
            let url = match first_href(item)? {
                Some(href) => absolutize(&page.url, &href),
                None => page.url.clone(),
            };
            let description = first_text(item, &paragraph)
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

            records.push(
                ScrapedOpportunity {
                    category: categorize_product(&title).to_string(),
                    title: format!("Recall: {title}"),
                    amount: remedy_for(&description).to_string(),
                    deadline: "Ongoing".to_string(),
                    difficulty: "Easy".to_string(),
                    description: truncate_description(&description),
                    claim_url: url.clone(),
                    details_url: url,
                    value: "good".to_string(),
                    source: "cpsc.gov".to_string(),
                }
                .into_record(),
            );
        }

        Ok(ListingParse {
            records,
            details: Vec::new(),
        })
    }
}
