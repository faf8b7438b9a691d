//! `eos watch`: re-run the homepage pre-render when the dataset changes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::Local;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

const FALLBACK_SWEEP: Duration = Duration::from_secs(5);

type Fingerprint = Option<(SystemTime, u64)>;

fn fingerprint(path: &Path) -> Fingerprint {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

pub async fn watch_and_prerender(index: PathBuf, data: PathBuf, site_url: String, debounce: Duration) -> Result<()> {
    rerender(&index, &data, &site_url).await;
    let mut last = fingerprint(&data);

    let mut fallback = tokio::time::interval(FALLBACK_SWEEP);
    let mut watcher = match start_watcher(&data) {
        Ok(pair) => {
            info!(path = %data.display(), "watching dataset");
            Some(pair)
        }
        Err(err) => {
            warn!(error = %err, "filesystem watcher unavailable; polling only");
            None
        }
    };

    loop {
        if let Some((_, rx)) = watcher.as_mut() {
            tokio::select! {
                _ = fallback.tick() => {
                    rerender_if_changed(&index, &data, &site_url, &mut last).await;
                }
                evt = rx.recv() => match evt {
                    Some(()) => {
                        debounce_events(rx, debounce).await;
                        rerender_if_changed(&index, &data, &site_url, &mut last).await;
                    }
                    None => {
                        warn!("watcher channel closed; polling only");
                        watcher = None;
                    }
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        } else {
            tokio::select! {
                _ = fallback.tick() => {
                    rerender_if_changed(&index, &data, &site_url, &mut last).await;
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }
    }

    info!("watch stopped");
    Ok(())
}

async fn rerender_if_changed(index: &Path, data: &Path, site_url: &str, last: &mut Fingerprint) {
    let now = fingerprint(data);
    if now != *last {
        *last = now;
        rerender(index, data, site_url).await;
    }
}

async fn rerender(index: &Path, data: &Path, site_url: &str) {
    let today = Local::now().date_naive();
    if let Err(err) = eos_web::prerender_homepage(index, data, today, site_url).await {
        warn!(error = %format!("{err:#}"), "pre-render failed");
    }
}

/// Returns once `window` passes with no new event.
pub async fn debounce_events(rx: &mut mpsc::UnboundedReceiver<()>, window: Duration) {
    let sleep = tokio::time::sleep_until(Instant::now() + window);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => break,
            maybe = rx.recv() => {
                if maybe.is_none() {
                    break;
                }
                sleep.as_mut().reset(Instant::now() + window);
            }
        }
    }
}

// Writes land via temp file + rename, so watch the directory and match on name.
fn start_watcher(data: &Path) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<()>)> {
    let dir = data
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let name = data
        .file_name()
        .map(OsString::from)
        .with_context(|| format!("{} has no file name", data.display()))?;

    let (tx, rx) = mpsc::unbounded_channel::<()>();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if event_touches(&event, &name) {
                let _ = tx.send(());
            }
        }
        Err(_) => {
            let _ = tx.send(());
        }
    })
    .context("initializing filesystem watcher")?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("watching {}", dir.display()))?;
    Ok((watcher, rx))
}

fn event_touches(event: &Event, name: &OsString) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|path| path.file_name().is_some_and(|n| n == name.as_os_str()))
}
