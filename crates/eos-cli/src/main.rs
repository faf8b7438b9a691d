use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use eos_core::{Catalog, FilterState, ListingPipeline, SortProfile};
use eos_storage::{load_dataset, BackoffPolicy, DatasetSource, FileKeyValueStore, HttpClientConfig, HttpFetcher, SavedStore};
use eos_sync::{IngestOutcome, SyncConfig, SyncPipeline};
use eos_web::{IndexUpdate, PublishMode, WebConfig};
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod watch;

#[derive(Debug, Parser)]
#[command(name = "eos")]
#[command(about = "eosguide opportunity directory")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the listing site.
    Serve,
    /// Scrape enabled sources and rewrite the dataset.
    Scrape {
        /// Keep running and scrape on EOS_SCRAPE_CRON instead of once.
        #[arg(long)]
        schedule: bool,
    },
    /// Append an issue-form submission to the dataset.
    IngestIssue {
        /// Issue body file; stdin when omitted.
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Drop records whose deadline has passed.
    Expire {
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Render the first cards into the static homepage.
    Prerender {
        #[arg(long, default_value = "index.html")]
        index: PathBuf,
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Build a settlement guide page from an article issue body.
    PublishArticle {
        /// Issue body file; stdin when omitted.
        #[arg(long)]
        file: Option<PathBuf>,
        /// `draft` writes to articles/drafts/; `publish` also lists it in articles/index.html.
        #[arg(long, default_value = "draft")]
        mode: PublishMode,
        /// Site root that holds the `articles/` directory.
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Re-run the pre-render whenever the dataset changes.
    Watch {
        #[arg(long, default_value = "index.html")]
        index: PathBuf,
        #[arg(long)]
        data: Option<PathBuf>,
        #[arg(long, default_value_t = 250)]
        debounce_ms: u64,
    },
    /// Print the filtered, sorted listing.
    List {
        /// Dataset path or URL.
        #[arg(long)]
        data: Option<String>,
        #[arg(long, short = 'q', default_value = "")]
        query: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "")]
        state: String,
        #[arg(long, default_value = "")]
        speed: String,
        #[arg(long, default_value = "")]
        difficulty: String,
        #[arg(long, default_value = "")]
        proof: String,
        #[arg(long)]
        sort: Option<SortProfile>,
        #[arg(long)]
        json: bool,
    },
}

fn data_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| SyncConfig::from_env().data_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("eos=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => eos_web::serve_from_env().await?,
        Commands::Scrape { schedule } => scrape(schedule).await?,
        Commands::IngestIssue { file, data } => ingest(file, data_path(data)).await?,
        Commands::PublishArticle { file, mode, root } => {
            let body = read_issue_body(file.as_deref()).await?;
            let site_url = WebConfig::from_env().site_url;
            let outcome = eos_web::publish_article(&body, &root, mode, &site_url).await?;
            println!("article written to {}", outcome.path.display());
            match outcome.index {
                IndexUpdate::Added => println!("added {} to articles/index.html", outcome.slug),
                IndexUpdate::AlreadyListed => println!("{} already in articles/index.html", outcome.slug),
                IndexUpdate::MissingIndex => println!("articles/index.html not found; index not updated"),
                IndexUpdate::MissingMarker => println!("articles/index.html has no insert marker; index not updated"),
                IndexUpdate::Skipped => {}
            }
        }
        Commands::Expire { data } => {
            let path = data_path(data);
            let (remaining, removed) = eos_sync::expire_file(&path, Local::now().date_naive()).await?;
            println!("expired {removed} record(s); {remaining} remain in {}", path.display());
        }
        Commands::Prerender { index, data } => {
            let site_url = WebConfig::from_env().site_url;
            let summary =
                eos_web::prerender_homepage(&index, &data_path(data), Local::now().date_naive(), &site_url).await?;
            println!(
                "pre-rendered {} cards into {} (total in dataset: {})",
                summary.rendered,
                index.display(),
                summary.total
            );
        }
        Commands::Watch { index, data, debounce_ms } => {
            let site_url = WebConfig::from_env().site_url;
            watch::watch_and_prerender(index, data_path(data), site_url, Duration::from_millis(debounce_ms)).await?
        }
        Commands::List {
            data,
            query,
            category,
            state,
            speed,
            difficulty,
            proof,
            sort,
            json,
        } => {
            let filter = FilterState {
                query,
                category,
                state,
                speed,
                difficulty,
                proof,
            }
            .normalized();
            list(data, filter, sort, json).await?
        }
    }

    Ok(())
}

async fn scrape(schedule: bool) -> Result<()> {
    let config = SyncConfig {
        scheduler_enabled: schedule,
        ..SyncConfig::from_env()
    };
    let pipeline = Arc::new(SyncPipeline::new(config)?);

    if !schedule {
        let summary = pipeline.run_once().await?;
        for source in &summary.sources {
            println!(
                "{:<18} {:?} records={}{}",
                source.source_id,
                source.status,
                source.records,
                source.error.as_deref().map(|e| format!(" error={e}")).unwrap_or_default()
            );
        }
        println!(
            "scrape complete: run_id={} scraped={} community={} duplicates={} expired={} written={} total={}",
            summary.run_id,
            summary.scraped,
            summary.kept_community,
            summary.duplicates_removed,
            summary.expired,
            summary.written,
            summary.total_written
        );
        return Ok(());
    }

    let cron = pipeline.config().scrape_cron.clone();
    let Some(scheduler) = Arc::clone(&pipeline).maybe_build_scheduler().await? else {
        return Ok(());
    };
    scheduler.start().await.context("starting scheduler")?;
    info!(%cron, "scheduler running; ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    Ok(())
}

async fn read_issue_body(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut body = String::new();
            tokio::io::stdin()
                .read_to_string(&mut body)
                .await
                .context("reading issue body from stdin")?;
            Ok(body)
        }
    }
}

async fn ingest(file: Option<PathBuf>, data: PathBuf) -> Result<()> {
    let body = read_issue_body(file.as_deref()).await?;

    let enrichment = SyncConfig::from_env().enrichment_hook()?;
    let outcome = eos_sync::ingest_issue(&body, &data, enrichment.as_ref(), Local::now().date_naive()).await?;
    match outcome {
        IngestOutcome::Appended { id, total } => {
            println!("added {id}; {} now has {total} record(s)", data.display())
        }
        IngestOutcome::Duplicate { id, matched } => {
            println!("skipped {id}: already listed (matched by {matched:?})")
        }
    }
    Ok(())
}

async fn list(data: Option<String>, filter: FilterState, sort: Option<SortProfile>, json: bool) -> Result<()> {
    let web = WebConfig::from_env();
    let source = data.map(|d| DatasetSource::parse(&d)).unwrap_or(web.data_source);
    let catalog = Catalog::load_or_default(&web.catalog_path)
        .with_context(|| format!("loading catalog {}", web.catalog_path.display()))?;
    let fetcher = HttpFetcher::new(HttpClientConfig {
        user_agent: Some(web.user_agent.clone()),
        backoff: BackoffPolicy::none(),
        ..Default::default()
    })?;

    let raws = load_dataset(&source, &fetcher)
        .await
        .with_context(|| format!("loading {source}"))?;
    let saved = SavedStore::new(FileKeyValueStore::new(web.saved_store_path.clone())).load();

    let pipeline = ListingPipeline::new(&catalog, sort.unwrap_or(web.sort_profile));
    let records = pipeline.normalize_all(&raws, Local::now().date_naive());
    let view = pipeline.view(&records, &filter, &saved);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }
    if let Some(empty) = view.empty {
        println!("{}", empty.message());
        return Ok(());
    }
    for card in &view.cards {
        let marker = if card.saved { "*" } else { " " };
        let urgency = card.days_left_label.as_deref().unwrap_or("");
        println!(
            "{marker} {:<60} {:<28} {:<12} {:<14} {}",
            truncate(&card.title, 60),
            truncate(&card.category, 28),
            card.state,
            card.deadline_label,
            urgency
        );
    }
    println!("{} of {}", view.count_label(), view.total);
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
