//! Axum + Askama site for the opportunity directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use askama::Template;
use axum::{
    extract::{FromRequest, Path as AxumPath, Query, Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Local;
use eos_core::share::ShareLinks;
use eos_core::{Catalog, FilterState, ListingPipeline, ListingView, SortProfile};
use eos_storage::{
    load_dataset, BackoffPolicy, DatasetSource, FileKeyValueStore, HttpClientConfig, HttpFetcher, KeyValueStore,
    SavedStore,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod article;
pub mod prerender;
pub mod subscribe;

pub use article::{publish_article, render_article, ArticleRenderError, IndexUpdate, PublishMode, PublishOutcome};
pub use prerender::{prerender_homepage, prerender_page, PrerenderError, PrerenderSummary};
pub use subscribe::{is_valid_email, SubscribeRelay, SubscribeRequest};

pub const CRATE_NAME: &str = "eos-web";

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_opt(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Local path or http(s) URL, re-read on every request.
    pub data_source: DatasetSource,
    pub catalog_path: PathBuf,
    pub saved_store_path: PathBuf,
    pub port: u16,
    pub search_debounce_ms: u64,
    pub sort_profile: SortProfile,
    pub site_url: String,
    pub page_title: String,
    pub subscribe_url: Option<String>,
    pub subscribe_api_key: Option<String>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            data_source: DatasetSource::File(PathBuf::from("data/opportunities.json")),
            catalog_path: PathBuf::from("config/catalog.yaml"),
            saved_store_path: PathBuf::from(".eos/saved.json"),
            port: 8000,
            search_debounce_ms: 250,
            sort_profile: SortProfile::default(),
            site_url: "https://eosguidehub.com".to_string(),
            page_title: "eosguide: money you may be owed".to_string(),
            subscribe_url: None,
            subscribe_api_key: None,
            user_agent: "eosguide-bot/0.1".to_string(),
            http_timeout_secs: 15,
        }
    }
}

impl WebConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let sort_profile = match env_opt("EOS_SORT_PROFILE").map(|v| v.parse::<SortProfile>()) {
            Some(Ok(profile)) => profile,
            Some(Err(err)) => {
                warn!(error = %err, "ignoring EOS_SORT_PROFILE");
                defaults.sort_profile
            }
            None => defaults.sort_profile,
        };
        Self {
            data_source: env_opt("EOS_DATA_PATH")
                .map(|v| DatasetSource::parse(&v))
                .unwrap_or(defaults.data_source),
            catalog_path: env_opt("EOS_CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.catalog_path),
            saved_store_path: env_opt("EOS_SAVED_STORE")
                .map(PathBuf::from)
                .unwrap_or(defaults.saved_store_path),
            port: env_parse("EOS_WEB_PORT", defaults.port),
            search_debounce_ms: env_parse("EOS_SEARCH_DEBOUNCE_MS", defaults.search_debounce_ms),
            sort_profile,
            site_url: env_opt("EOS_SITE_URL").unwrap_or(defaults.site_url),
            page_title: defaults.page_title,
            subscribe_url: env_opt("EOS_SUBSCRIBE_URL"),
            subscribe_api_key: env_opt("EOS_SUBSCRIBE_API_KEY"),
            user_agent: env_opt("EOS_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: env_parse("EOS_HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
        }
    }
}

pub struct AppState {
    pub config: WebConfig,
    pub catalog: Catalog,
    fetcher: HttpFetcher,
    saved: Mutex<SavedStore<Box<dyn KeyValueStore>>>,
    subscribe: Option<SubscribeRelay>,
}

impl AppState {
    pub fn new(config: WebConfig, catalog: Catalog, store: Box<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        // The listing fetch is a single attempt; failures become the "unable to load" state.
        let fetcher = HttpFetcher::new(HttpClientConfig {
            timeout,
            user_agent: Some(config.user_agent.clone()),
            backoff: BackoffPolicy::none(),
            ..Default::default()
        })?;
        let subscribe = match &config.subscribe_url {
            Some(url) => Some(SubscribeRelay::new(url.clone(), config.subscribe_api_key.clone(), timeout)?),
            None => None,
        };
        Ok(Self {
            config,
            catalog,
            fetcher,
            saved: Mutex::new(SavedStore::new(store)),
            subscribe,
        })
    }

    pub fn from_config(config: WebConfig) -> anyhow::Result<Self> {
        let catalog = Catalog::load_or_default(&config.catalog_path)
            .with_context(|| format!("loading catalog {}", config.catalog_path.display()))?;
        let store: Box<dyn KeyValueStore> = Box::new(FileKeyValueStore::new(config.saved_store_path.clone()));
        Self::new(config, catalog, store)
    }
}

#[derive(Debug, Clone)]
struct SelectOption {
    value: String,
    label: String,
    selected: bool,
}

fn select_options<I, V, L>(choices: I, current: &str) -> Vec<SelectOption>
where
    I: IntoIterator<Item = (V, L)>,
    V: Into<String>,
    L: Into<String>,
{
    let current = current.trim();
    choices
        .into_iter()
        .map(|(value, label)| {
            let value = value.into();
            SelectOption {
                selected: value.eq_ignore_ascii_case(current),
                value,
                label: label.into(),
            }
        })
        .collect()
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    page_title: String,
    debounce_ms: u64,
    filter: FilterState,
    categories: Vec<SelectOption>,
    states: Vec<SelectOption>,
    speeds: Vec<SelectOption>,
    difficulties: Vec<SelectOption>,
    proofs: Vec<SelectOption>,
    view: Option<ListingView>,
    subscribe_enabled: bool,
    share: ShareLinks,
}

#[derive(Template)]
#[template(path = "listing_partial.html")]
struct ListingPartialTemplate {
    view: Option<ListingView>,
}

#[derive(Template)]
#[template(path = "saved_button.html")]
struct SavedButtonTemplate {
    id: String,
    saved: bool,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/opportunities", get(listing_handler))
        .route("/saved/{id}", post(saved_toggle_handler))
        .route("/api/subscribe", post(subscribe_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

pub async fn serve(config: WebConfig) -> anyhow::Result<()> {
    let port = config.port;
    let state = AppState::from_config(config)?;
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, data = %state.config.data_source, "web server listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    serve(WebConfig::from_env()).await
}

/// `None` when the dataset cannot be loaded.
async fn load_listing(state: &AppState, filter: &FilterState) -> Option<ListingView> {
    let saved = state.saved.lock().await.load();
    let raws = match load_dataset(&state.config.data_source, &state.fetcher).await {
        Ok(raws) => raws,
        Err(err) => {
            warn!(source = %state.config.data_source, error = %err, "dataset unavailable");
            return None;
        }
    };
    let today = Local::now().date_naive();
    let pipeline = ListingPipeline::new(&state.catalog, state.config.sort_profile);
    let records = pipeline.normalize_all(&raws, today);
    Some(pipeline.view(&records, filter, &saved))
}

async fn index_handler(State(state): State<Arc<AppState>>, Query(filter): Query<FilterState>) -> Response {
    let filter = filter.normalized();
    let view = load_listing(&state, &filter).await;

    let categories = select_options(
        [
            ("".to_string(), "All categories".to_string()),
            ("saved".to_string(), "Saved".to_string()),
            ("ending".to_string(), "Ending soon".to_string()),
            ("national".to_string(), "Nationwide".to_string()),
        ]
        .into_iter()
        .chain(state.catalog.category_ranks.iter().map(|c| (c.clone(), c.clone()))),
        &filter.category,
    );
    let states = select_options(
        [
            ("".to_string(), "All states".to_string()),
            ("Nationwide".to_string(), "Nationwide only".to_string()),
        ]
        .into_iter()
        .chain(state.catalog.states.iter().map(|(code, name)| (code.clone(), name.clone()))),
        &filter.state,
    );

    render_html(IndexTemplate {
        page_title: state.config.page_title.clone(),
        debounce_ms: state.config.search_debounce_ms,
        categories,
        states,
        speeds: select_options(
            [("", "Any payout speed"), ("Fast", "Fast"), ("Medium", "Medium"), ("Slow", "Slow")],
            &filter.speed,
        ),
        difficulties: select_options(
            [("", "Any difficulty"), ("Easy", "Easy"), ("Medium", "Medium"), ("Hard", "Hard")],
            &filter.difficulty,
        ),
        proofs: select_options([("", "Proof: any"), ("Yes", "Proof required"), ("No", "No proof")], &filter.proof),
        filter,
        view,
        subscribe_enabled: state.subscribe.is_some(),
        share: ShareLinks::for_page(&state.config.site_url, &state.config.page_title),
    })
}

async fn listing_handler(State(state): State<Arc<AppState>>, Query(filter): Query<FilterState>) -> Response {
    let filter = filter.normalized();
    let view = load_listing(&state, &filter).await;
    render_html(ListingPartialTemplate { view })
}

async fn saved_toggle_handler(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Response {
    let toggled = state.saved.lock().await.toggle(&id);
    match toggled {
        Ok(saved) => {
            info!(%id, saved, "saved set toggled");
            let mut resp = render_html(SavedButtonTemplate { id, saved });
            resp.headers_mut().insert(
                HeaderName::from_static("hx-trigger"),
                HeaderValue::from_static("savedChanged"),
            );
            resp
        }
        Err(err) => server_error(err.into()),
    }
}

fn subscribe_reply(status: StatusCode, error: Option<&str>) -> Response {
    let body = match error {
        Some(message) => json!({ "ok": false, "error": message }),
        None => json!({ "ok": status.is_success() }),
    };
    (status, Json(body)).into_response()
}

async fn subscribe_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().starts_with("application/json"));
    let payload = if is_json {
        Json::<SubscribeRequest>::from_request(request, &()).await.ok().map(|Json(p)| p)
    } else {
        Form::<SubscribeRequest>::from_request(request, &()).await.ok().map(|Form(p)| p)
    }
    .unwrap_or_default();

    if !is_valid_email(&payload.email) {
        return subscribe_reply(StatusCode::BAD_REQUEST, Some("a valid email address is required"));
    }
    let Some(relay) = &state.subscribe else {
        return subscribe_reply(StatusCode::SERVICE_UNAVAILABLE, Some("subscriptions are not configured"));
    };
    let status = relay.forward(&payload.email).await;
    subscribe_reply(status, None)
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    warn!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}
