//! Settlement guide pages built from article submissions, plus the card
//! added to `articles/index.html` when a page is published.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use askama::Template;
use eos_adapters::{ArticleError, ArticleSubmission, Faq, IssueForm};
use eos_storage::write_atomic;
use pulldown_cmark::{html, Event, Options, Parser};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

pub const ARTICLES_INSERT_MARKER: &str = "<!-- ARTICLES_LIST_INSERT_HERE -->";
const FALLBACK_OG_IMAGE: &str = "Circular-badge-logo.png";

#[derive(Debug, Error)]
pub enum ArticleRenderError {
    #[error(transparent)]
    Invalid(#[from] ArticleError),
    #[error("rendering article: {0}")]
    Render(#[from] askama::Error),
    #[error("encoding structured data: {0}")]
    Schema(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// Written under `articles/drafts/`; the index is left alone.
    #[default]
    Draft,
    Publish,
}

impl FromStr for PublishMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "publish" => Ok(Self::Publish),
            other => Err(format!("unknown publish mode {other:?} (expected draft or publish)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenefitCard {
    pub label: &'static str,
    pub amount: String,
    pub desc: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineRow {
    pub action: &'static str,
    pub date: String,
    pub why: &'static str,
    pub urgent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarRow {
    pub label: &'static str,
    pub value: String,
    pub class: &'static str,
}

#[derive(Template)]
#[template(path = "article.html")]
struct ArticleTemplate<'a> {
    article: &'a ArticleSubmission,
    canonical: String,
    og_image: String,
    hero_src: Option<String>,
    body_html: String,
    benefits: Vec<BenefitCard>,
    deadlines: Vec<DeadlineRow>,
    facts: Vec<SidebarRow>,
    deadline_facts: Vec<SidebarRow>,
    article_schema: String,
    faq_schema: Option<String>,
}

#[derive(Template)]
#[template(path = "article_index_card.html")]
struct ArticleIndexCardTemplate<'a> {
    article: &'a ArticleSubmission,
    path: String,
    show_deadline: bool,
}

/// Markdown to HTML with tables. Raw HTML in the source is shown as text.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

pub fn benefit_cards(article: &ArticleSubmission) -> Vec<BenefitCard> {
    [
        (
            "Documented Losses",
            &article.max_payment,
            "Max reimbursement with receipts or supporting documents.",
        ),
        (
            "Pro Rata Cash",
            &article.nodoc_payment,
            "No documentation needed. Amount may adjust based on total claims.",
        ),
        (
            "CA Statutory (CA only)",
            &article.ca_payment,
            "Additional payment for California residents, subject to pro-rata adjustment.",
        ),
        (
            "Credit Monitoring",
            &article.credit_monitoring,
            "Free credit and identity monitoring included with your claim.",
        ),
    ]
    .into_iter()
    .filter(|(_, amount, _)| !amount.is_empty())
    .map(|(label, amount, desc)| BenefitCard {
        label,
        amount: amount.clone(),
        desc,
    })
    .collect()
}

/// Claim, opt-out, objection (same date as opt-out) and hearing rows.
pub fn deadline_rows(article: &ArticleSubmission) -> Vec<DeadlineRow> {
    let mut rows = Vec::new();
    if !article.deadline.is_empty() {
        rows.push(DeadlineRow {
            action: "File a Claim",
            date: article.deadline.clone(),
            why: "Only way to receive money or credit monitoring",
            urgent: true,
        });
    }
    if !article.optout_deadline.is_empty() {
        rows.push(DeadlineRow {
            action: "Opt Out (Exclude Yourself)",
            date: article.optout_deadline.clone(),
            why: "Preserves your right to sue the defendant separately",
            urgent: false,
        });
        rows.push(DeadlineRow {
            action: "Submit an Objection",
            date: article.optout_deadline.clone(),
            why: "Tell the court you oppose the settlement terms",
            urgent: false,
        });
    }
    if !article.hearing_date.is_empty() {
        rows.push(DeadlineRow {
            action: "Final Approval Hearing",
            date: article.hearing_date.clone(),
            why: "Court decides whether to approve the settlement",
            urgent: false,
        });
    }
    rows
}

fn sidebar_rows(rows: [(&'static str, String, &'static str); 7]) -> Vec<SidebarRow> {
    rows.into_iter()
        .filter(|(_, value, _)| !value.is_empty())
        .map(|(label, value, class)| SidebarRow { label, value, class })
        .collect()
}

pub fn quick_facts(article: &ArticleSubmission) -> Vec<SidebarRow> {
    let ca_extra = if article.ca_payment.is_empty() {
        String::new()
    } else {
        format!("+{} extra", article.ca_payment)
    };
    sidebar_rows([
        ("Total Fund", article.settlement_amount.clone(), "accent"),
        ("Max Per Person", article.max_payment.clone(), ""),
        ("No-Doc Cash", article.nodoc_payment.clone(), ""),
        ("CA Residents", ca_extra, ""),
        ("Incident Date", article.incident_date.clone(), ""),
        ("Defendant", article.defendant.clone(), ""),
        ("Court", article.court.clone(), ""),
    ])
}

fn deadline_facts(article: &ArticleSubmission) -> Vec<SidebarRow> {
    [
        ("File By", &article.deadline, "amber"),
        ("Opt-Out By", &article.optout_deadline, ""),
        ("Final Hearing", &article.hearing_date, ""),
    ]
    .into_iter()
    .filter(|(_, value, _)| !value.is_empty())
    .map(|(label, value, class)| SidebarRow {
        label,
        value: value.clone(),
        class,
    })
    .collect()
}

// JSON inside <script> must not close the element early.
fn script_json(value: &Value) -> Result<String, serde_json::Error> {
    Ok(serde_json::to_string_pretty(value)?.replace("</", "<\\/"))
}

pub fn faq_schema(faqs: &[Faq]) -> Result<Option<String>, serde_json::Error> {
    if faqs.is_empty() {
        return Ok(None);
    }
    let entities: Vec<Value> = faqs
        .iter()
        .map(|faq| {
            json!({
                "@type": "Question",
                "name": faq.question,
                "acceptedAnswer": {"@type": "Answer", "text": faq.answer},
            })
        })
        .collect();
    script_json(&json!({
        "@context": "https://schema.org",
        "@type": "FAQPage",
        "mainEntity": entities,
    }))
    .map(Some)
}

fn article_schema(article: &ArticleSubmission, canonical: &str, site: &str) -> Result<String, serde_json::Error> {
    let org = json!({"@type": "Organization", "name": "eosguide", "url": site});
    script_json(&json!({
        "@context": "https://schema.org",
        "@type": "Article",
        "headline": article.title,
        "description": article.blurb,
        "dateModified": article.last_updated,
        "author": org,
        "publisher": org,
        "mainEntityOfPage": {"@type": "WebPage", "@id": canonical},
    }))
}

pub fn render_article(article: &ArticleSubmission, site_url: &str) -> Result<String, ArticleRenderError> {
    article.validate()?;
    let site = site_url.trim_end_matches('/');
    let canonical = format!("{site}{}", article.path());
    let hero_src = (!article.hero_image.is_empty()).then(|| format!("/assets/articles/{}", article.hero_image));
    let og_image = match &hero_src {
        Some(src) => format!("{site}{src}"),
        None => format!("{site}/{FALLBACK_OG_IMAGE}"),
    };

    let page = ArticleTemplate {
        article,
        article_schema: article_schema(article, &canonical, site)?,
        faq_schema: faq_schema(&article.faqs)?,
        canonical,
        og_image,
        hero_src,
        body_html: markdown_to_html(&article.body),
        benefits: benefit_cards(article),
        deadlines: deadline_rows(article),
        facts: quick_facts(article),
        deadline_facts: deadline_facts(article),
    };
    Ok(page.render()?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexUpdate {
    Added,
    AlreadyListed,
    /// Draft mode never touches the index.
    Skipped,
    MissingIndex,
    MissingMarker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub slug: String,
    pub path: PathBuf,
    pub index: IndexUpdate,
}

pub fn article_output_path(root: &Path, slug: &str, mode: PublishMode) -> PathBuf {
    let dir = root.join("articles");
    let dir = match mode {
        PublishMode::Draft => dir.join("drafts"),
        PublishMode::Publish => dir,
    };
    dir.join(format!("{slug}.html"))
}

/// Insert the card right after the marker unless the article is already
/// linked. Returns the outcome and the page to write when it changed.
pub fn insert_index_card(
    index: &str,
    article: &ArticleSubmission,
) -> Result<(IndexUpdate, Option<String>), ArticleRenderError> {
    let path = article.path();
    if index.contains(&path) {
        return Ok((IndexUpdate::AlreadyListed, None));
    }
    let Some(at) = index.find(ARTICLES_INSERT_MARKER) else {
        return Ok((IndexUpdate::MissingMarker, None));
    };
    let deadline = article.deadline.trim();
    let card = ArticleIndexCardTemplate {
        article,
        path,
        show_deadline: !deadline.is_empty() && !deadline.eq_ignore_ascii_case("none listed"),
    }
    .render()?;

    let split = at + ARTICLES_INSERT_MARKER.len();
    let mut out = String::with_capacity(index.len() + card.len() + 2);
    out.push_str(&index[..split]);
    out.push('\n');
    out.push_str(card.trim());
    out.push('\n');
    out.push_str(&index[split..]);
    Ok((IndexUpdate::Added, Some(out)))
}

async fn update_articles_index(root: &Path, article: &ArticleSubmission) -> anyhow::Result<IndexUpdate> {
    let index_path = root.join("articles").join("index.html");
    let index = match tokio::fs::read_to_string(&index_path).await {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %index_path.display(), "articles index not found; skipping");
            return Ok(IndexUpdate::MissingIndex);
        }
        Err(err) => return Err(err).with_context(|| format!("reading {}", index_path.display())),
    };
    let (outcome, updated) = insert_index_card(&index, article)?;
    match updated {
        Some(page) => {
            write_atomic(&index_path, page.as_bytes()).await?;
        }
        None if outcome == IndexUpdate::MissingMarker => {
            warn!(path = %index_path.display(), marker = ARTICLES_INSERT_MARKER, "articles index has no insert marker");
        }
        None => {}
    }
    Ok(outcome)
}

/// Parse an article issue body, write its page under `root`, and list it in
/// the articles index when publishing.
pub async fn publish_article(
    body: &str,
    root: &Path,
    mode: PublishMode,
    site_url: &str,
) -> anyhow::Result<PublishOutcome> {
    let article = IssueForm::parse(body).article();
    let html = render_article(&article, site_url)?;
    let slug = article.slug.trim().to_string();
    let path = article_output_path(root, &slug, mode);
    write_atomic(&path, html.as_bytes()).await?;
    info!(%slug, path = %path.display(), ?mode, "article written");

    let index = match mode {
        PublishMode::Draft => IndexUpdate::Skipped,
        PublishMode::Publish => update_articles_index(root, &article).await?,
    };
    Ok(PublishOutcome { slug, path, index })
}
