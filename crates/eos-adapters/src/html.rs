//! Small scraping helpers shared by the HTML adapters.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::AdapterError;

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$[\d,]+(?:\.\d{2})?(?:\s*(?:million|billion))?").unwrap()
});

pub(crate) const DESCRIPTION_LIMIT: usize = 200;

pub(crate) fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Selector(format!("{css}: {e}")))
}

/// Element text with runs of whitespace collapsed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn document_text(document: &Html) -> String {
    element_text(document.root_element())
}

pub(crate) fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope
        .select(sel)
        .map(element_text)
        .find(|text| !text.is_empty())
}

pub(crate) fn first_href(scope: ElementRef<'_>) -> Result<Option<String>, AdapterError> {
    let links = selector("a[href]")?;
    Ok(scope
        .select(&links)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .find(|href| !href.is_empty())
        .map(str::to_string))
}

/// Resolve `href` against the page it was found on.
pub(crate) fn absolutize(base: &str, href: &str) -> String {
    url::Url::parse(base)
        .and_then(|base| base.join(href))
        .map(String::from)
        .unwrap_or_else(|_| href.to_string())
}

pub(crate) fn first_amount(text: &str) -> Option<String> {
    AMOUNT.find(text).map(|m| m.as_str().trim().to_string())
}

pub(crate) fn truncate_description(text: &str) -> String {
    if text.chars().count() > DESCRIPTION_LIMIT {
        let head: String = text.chars().take(DESCRIPTION_LIMIT).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn nearest_container(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| matches!(a.value().name(), "div" | "article"))
}

/// Listing blocks on government index pages: `div`/`article` elements whose
/// class matches `class_pattern`, or failing that the nearest container of
/// every link whose href matches `href_pattern`.
pub(crate) fn listing_sections<'a>(
    document: &'a Html,
    class_pattern: &Regex,
    href_pattern: &Regex,
    max_items: usize,
) -> Result<Vec<ElementRef<'a>>, AdapterError> {
    let classed = selector("div[class], article[class]")?;
    let by_class: Vec<ElementRef<'a>> = document
        .select(&classed)
        .filter(|el| {
            el.value()
                .attr("class")
                .is_some_and(|class| class_pattern.is_match(class))
        })
        .take(max_items)
        .collect();
    if !by_class.is_empty() {
        return Ok(by_class);
    }

    let links = selector("a[href]")?;
    let mut sections: Vec<ElementRef<'a>> = Vec::new();
    for link in document.select(&links) {
        let href = link.value().attr("href").unwrap_or_default();
        if !href_pattern.is_match(href) {
            continue;
        }
        if let Some(container) = nearest_container(link) {
            if !sections.contains(&container) {
                sections.push(container);
            }
        }
        if sections.len() >= max_items {
            break;
        }
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_matches_money_phrases() {
        assert_eq!(first_amount("Pays up to $1,250.00 each").as_deref(), Some("$1,250.00"));
        assert_eq!(first_amount("a $2.5 fund").as_deref(), Some("$2"));
        assert_eq!(first_amount("The $14 million fund").as_deref(), Some("$14 million"));
        assert_eq!(first_amount("no money here"), None);
    }

    #[test]
    fn descriptions_truncate_on_char_boundaries() {
        let long = "é".repeat(250);
        let out = truncate_description(&long);
        assert_eq!(out.chars().count(), 203);
        assert!(out.ends_with("..."));
        assert_eq!(truncate_description("short"), "short");
    }

    #[test]
    fn relative_links_resolve() {
        assert_eq!(
            absolutize("https://www.ftc.gov/enforcement/refunds", "/enforcement/refunds/acme"),
            "https://www.ftc.gov/enforcement/refunds/acme"
        );
        assert_eq!(absolutize("https://a.test/", "https://b.test/x"), "https://b.test/x");
    }

    #[test]
    fn text_is_whitespace_collapsed() {
        let doc = Html::parse_fragment("<div>  Hello\n   <b>there</b>  </div>");
        assert_eq!(document_text(&doc), "Hello there");
    }
}
