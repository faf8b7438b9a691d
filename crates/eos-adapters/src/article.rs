//! Article submissions: the long-form issue template that becomes a
//! settlement guide page under `articles/`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::issue::IssueForm;

static NUMBERED_STEP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\s+(.+)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArticleError {
    #[error("article submission has no title")]
    MissingTitle,
    #[error("article submission has no URL slug")]
    MissingSlug,
    #[error("URL slug {0:?} may only use lowercase letters, digits and dashes")]
    InvalidSlug(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArticleSubmission {
    pub title: String,
    pub slug: String,
    pub blurb: String,
    pub deadline: String,
    pub optout_deadline: String,
    pub hearing_date: String,
    pub last_updated: String,
    pub settlement_amount: String,
    pub max_payment: String,
    pub nodoc_payment: String,
    pub ca_payment: String,
    pub credit_monitoring: String,
    pub official_website: String,
    pub defendant: String,
    pub incident_date: String,
    pub court: String,
    pub hero_image: String,
    pub hero_credit: String,
    pub eligibility: Vec<String>,
    pub steps: Vec<String>,
    pub faqs: Vec<Faq>,
    /// Markdown source of the free-form body.
    pub body: String,
    pub monetization: bool,
}

impl IssueForm {
    pub fn article(&self) -> ArticleSubmission {
        ArticleSubmission {
            title: self.text(&["Article title"]),
            slug: self.text(&["URL slug"]).to_lowercase(),
            blurb: self.text(&["Short blurb"]),
            deadline: self.text(&["Claim deadline", "Deadline"]),
            optout_deadline: self.text(&["Opt-out deadline"]),
            hearing_date: self.text(&["Final approval hearing date"]),
            last_updated: self.text(&["Last updated"]),
            settlement_amount: self.text(&["Total settlement fund"]),
            max_payment: self.text(&["Maximum payment per person"]),
            nodoc_payment: self.text(&["No-documentation cash payment"]),
            ca_payment: self.text(&["California statutory payment"]),
            credit_monitoring: self.text(&["Credit monitoring"]),
            official_website: self.text(&["Official settlement website"]),
            defendant: self.text(&["Defendant / company name", "Defendant"]),
            incident_date: self.text(&["When did the incident occur?", "Incident date"]),
            court: self.text(&["Court & jurisdiction", "Court"]),
            hero_image: self.text(&["Hero image filename"]),
            hero_credit: self.text(&["Hero image credit (optional)", "Hero image credit"]),
            eligibility: parse_bullets(&self.text(&["Who is eligible? (bulleted list)", "Who is eligible?"])),
            steps: parse_steps(&self.text(&["How to file a claim (numbered steps)", "How to file a claim"])),
            faqs: parse_faqs(&self.text(&["Frequently asked questions", "FAQs"])),
            body: self.text(&["Article body (markdown)", "Article body"]),
            monetization: self.checked(&["Monetization"]),
        }
    }
}

impl ArticleSubmission {
    pub fn validate(&self) -> Result<(), ArticleError> {
        if self.title.trim().is_empty() {
            return Err(ArticleError::MissingTitle);
        }
        let slug = self.slug.trim();
        if slug.is_empty() {
            return Err(ArticleError::MissingSlug);
        }
        let allowed = slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !allowed || slug.starts_with('-') {
            return Err(ArticleError::InvalidSlug(slug.to_string()));
        }
        Ok(())
    }

    /// Site-relative path the published page is served from.
    pub fn path(&self) -> String {
        format!("/articles/{}.html", self.slug.trim())
    }
}

/// One item per non-blank line, list markers removed.
pub fn parse_bullets(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim().trim_start_matches(['-', '*']).trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Only `N. text` lines count as steps.
pub fn parse_steps(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| NUMBERED_STEP.captures(line.trim()))
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

/// `Q:` opens a question, `A:` starts its answer, and later lines continue the
/// answer. A question without an answer is dropped.
pub fn parse_faqs(text: &str) -> Vec<Faq> {
    let mut faqs = Vec::new();
    let mut question: Option<String> = None;
    let mut answer: Vec<String> = Vec::new();

    let mut flush = |question: &mut Option<String>, answer: &mut Vec<String>| {
        if let Some(q) = question.take() {
            if !answer.is_empty() {
                faqs.push(Faq {
                    question: q,
                    answer: answer.join(" "),
                });
            }
        }
        answer.clear();
    };

    for line in text.lines().map(str::trim) {
        let lower = line.to_lowercase();
        if lower.starts_with("q:") {
            flush(&mut question, &mut answer);
            question = Some(line[2..].trim().to_string());
        } else if lower.starts_with("a:") && question.is_some() {
            answer = vec![line[2..].trim().to_string()];
        } else if !line.is_empty() && !answer.is_empty() {
            answer.push(line.to_string());
        }
    }
    flush(&mut question, &mut answer);
    faqs
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE_BODY: &str = "### Article title\n\nAcme Data Breach Settlement\n\n### URL slug\n\nAcme-Data-Breach\n\n### Short blurb\n\nAcme customers can claim up to $5,000.\n\n### Claim deadline\n\nDecember 15, 2026\n\n### Opt-out deadline\n\nNovember 1, 2026\n\n### Final approval hearing date\n\n_No response_\n\n### Maximum payment per person\n\n$5,000\n\n### No-documentation cash payment\n\n$100\n\n### Official settlement website\n\nhttps://acmesettlement.com\n\n### Who is eligible? (bulleted list)\n\n- You received a breach notice\n* You lived in the US in 2024\n\n### How to file a claim (numbered steps)\n\n1. Find your notice ID\nnot a step\n2. File online\n\n### Frequently asked questions\n\nQ: Do I need receipts?\nA: Only for documented losses.\nKeep copies.\nQ: Unanswered?\n\n### Article body (markdown)\n\n## Background\n\nAcme disclosed a breach.\n\n### Monetization\n\n- [x] Show the credit monitoring note\n";

    #[test]
    fn parses_the_article_form() {
        let article = IssueForm::parse(ARTICLE_BODY).article();
        assert_eq!(article.title, "Acme Data Breach Settlement");
        assert_eq!(article.slug, "acme-data-breach");
        assert_eq!(article.deadline, "December 15, 2026");
        assert_eq!(article.hearing_date, "");
        assert_eq!(article.eligibility, vec!["You received a breach notice", "You lived in the US in 2024"]);
        assert_eq!(article.steps, vec!["Find your notice ID", "File online"]);
        assert_eq!(
            article.faqs,
            vec![Faq {
                question: "Do I need receipts?".into(),
                answer: "Only for documented losses. Keep copies.".into(),
            }]
        );
        assert_eq!(article.body, "## Background\n\nAcme disclosed a breach.");
        assert!(article.monetization);
        assert_eq!(article.path(), "/articles/acme-data-breach.html");
        assert!(article.validate().is_ok());
    }

    #[test]
    fn title_and_a_safe_slug_are_required() {
        let missing = IssueForm::parse("### URL slug\nx\n").article();
        assert_eq!(missing.validate(), Err(ArticleError::MissingTitle));

        let no_slug = IssueForm::parse("### Article title\nX\n").article();
        assert_eq!(no_slug.validate(), Err(ArticleError::MissingSlug));

        let traversal = IssueForm::parse("### Article title\nX\n### URL slug\n../index\n").article();
        assert_eq!(traversal.validate(), Err(ArticleError::InvalidSlug("../index".into())));
    }

    #[test]
    fn faq_lines_before_any_question_are_ignored() {
        let faqs = parse_faqs("stray line\nA: orphan answer\nq: lower case?\na: yes");
        assert_eq!(
            faqs,
            vec![Faq {
                question: "lower case?".into(),
                answer: "yes".into(),
            }]
        );
    }
}
