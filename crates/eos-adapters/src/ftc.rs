//! FTC consumer refund programs (`ftc.gov/enforcement/refunds`).

use std::sync::LazyLock;

use regex::Regex;

use crate::html::{absolutize, element_text, first_amount, first_href, first_text, listing_sections, selector, truncate_description};
use crate::{AdapterError, FetchedPage, ListingParse, ListingTarget, ScrapedOpportunity, SourceAdapter};

pub const SOURCE_ID: &str = "ftc-refunds";
pub const LISTING_URL: &str = "https://www.ftc.gov/enforcement/refunds";

const DEFAULT_DESCRIPTION: &str =
    "FTC consumer refund program. Visit official site for eligibility and claim details.";
const TITLE_WORDS: [&str; 3] = ["refund", "settlement", "redress"];

static SECTION_CLASS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)refund|program").unwrap());
static REFUND_HREF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/enforcement/refunds/").unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct FtcRefunds;

impl SourceAdapter for FtcRefunds {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn display_name(&self) -> &'static str {
        "FTC Refunds"
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
        for section in listing_sections(&document, &SECTION_CLASS, &REFUND_HREF, max_items)? {
            let Some(title) = first_text(section, &heading) else {
                continue;
            };
            let lower = title.to_lowercase();
            if !TITLE_WORDS.iter().any(|word| lower.contains(word)) {
                continue;
            }
            let url = match first_href(section)? {
                Some(href) => absolutize(&page.url, &href),
                None => page.url.clone(),
            };
            let description = first_text(section, &paragraph)
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
            let amount = first_amount(&element_text(section)).unwrap_or_else(|| "Varies".to_string());

            records.push(
                ScrapedOpportunity {
                    title: format!("FTC: {title}"),
                    category: "Unclaimed money & refunds".to_string(),
                    amount,
                    deadline: "Check program".to_string(),
                    difficulty: "Medium".to_string(),
                    description: truncate_description(&description),
                    claim_url: url.clone(),
                    details_url: url,
                    value: "good".to_string(),
                    source: "ftc.gov".to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> FetchedPage {
        FetchedPage::from_html(
            LISTING_URL,
            include_str!("../../../fixtures/ftc-refunds/listing.html"),
        )
    }

    #[test]
    fn parses_refund_programs_from_classed_blocks() {
        let parsed = FtcRefunds.parse_listing(&fixture(), 20).unwrap();
        assert!(parsed.details.is_empty());
        let titles: Vec<String> = parsed
            .records
            .iter()
            .filter_map(|r| r.text(&["title"]))
            .collect();
        assert_eq!(
            titles,
            vec![
                "FTC: Acme Subscription Refunds".to_string(),
                "FTC: Globex Settlement Payments".to_string(),
            ]
        );

        let first = &parsed.records[0];
        assert_eq!(
            first.text(&["url"]).as_deref(),
            Some("https://www.ftc.gov/enforcement/refunds/acme-subscription-refunds")
        );
        assert_eq!(first.text(&["amount"]).as_deref(), Some("$42 million"));
        assert_eq!(first.text(&["deadline"]).as_deref(), Some("Check program"));
        assert_eq!(first.text(&["source"]).as_deref(), Some("ftc.gov"));

        let second = &parsed.records[1];
        assert_eq!(second.text(&["amount"]).as_deref(), Some("Varies"));
        assert_eq!(second.text(&["description"]).as_deref(), Some(DEFAULT_DESCRIPTION));
    }

    #[test]
    fn falls_back_to_refund_links_and_caps_items() {
        let page = FetchedPage::from_html(
            LISTING_URL,
            r#"<html><body>
                <div><a href="/enforcement/refunds/one">Initech refunds</a><p>About $300 each.</p></div>
                <div><a href="/enforcement/refunds/two">Umbrella redress program</a></div>
                <div><a href="/news/other">Unrelated refund news</a></div>
            </body></html>"#,
        );
        let parsed = FtcRefunds.parse_listing(&page, 1).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].text(&["title"]).as_deref(), Some("FTC: Initech refunds"));
        assert_eq!(parsed.records[0].text(&["amount"]).as_deref(), Some("$300"));
    }
}
