//! Hot reload: watch `config.toml`, re-validate on change, and publish a new
//! router snapshot. A reload that fails keeps the previous snapshot.

use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::{Config, SnapshotStore};
use crate::handlers::HandlerRegistry;

const DEBOUNCE: Duration = Duration::from_millis(500);
const SETTLE_DELAY: Duration = Duration::from_millis(100);

pub struct ConfigWatcher {
    config_path: PathBuf,
    store: Arc<SnapshotStore>,
    handlers: Option<Arc<HandlerRegistry>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl ConfigWatcher {
    pub fn new(config_path: impl Into<PathBuf>, store: Arc<SnapshotStore>) -> Self {
        Self {
            config_path: config_path.into(),
            store,
            handlers: None,
            watcher: Mutex::new(None),
        }
    }

    /// Also rebuild the handler set on every successful reload.
    pub fn with_handlers(mut self, handlers: Arc<HandlerRegistry>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Re-read the config file and publish it. On any error the current
    /// snapshot and handler set stay in place.
    pub async fn reload(&self) -> Result<()> {
        reload_into(&self.config_path, &self.store, self.handlers.as_deref()).await
    }

    /// Start watching the config file's directory. Events are debounced and
    /// handled on a background task.
    pub fn start(&self) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let file_name = self.config_path.file_name().map(ToOwned::to_owned);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == file_name.as_deref());
                    if touches_config && (event.kind.is_modify() || event.kind.is_create()) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Config watcher error: {e}"),
            }
        })
        .context("Failed to create config watcher")?;

        let parent = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;
        watcher
            .watch(parent, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", parent.display()))?;
        *self.watcher.lock() = Some(watcher);

        let config_path = self.config_path.clone();
        let store = Arc::clone(&self.store);
        let handlers = self.handlers.clone();
        tokio::spawn(async move {
            let mut last_reload: Option<Instant> = None;
            while rx.recv().await.is_some() {
                // Trailing edge: an event inside the window waits it out, then reloads.
                if let Some(remaining) =
                    last_reload.and_then(|t| DEBOUNCE.checked_sub(t.elapsed()))
                {
                    tokio::time::sleep(remaining).await;
                }
                // Let the writer finish its rename
                tokio::time::sleep(SETTLE_DELAY).await;
                while rx.try_recv().is_ok() {}

                if let Err(e) = reload_into(&config_path, &store, handlers.as_deref()).await {
                    tracing::warn!("Config reload failed, keeping previous config: {e:#}");
                }
                last_reload = Some(Instant::now());
            }
        });

        tracing::info!(path = %self.config_path.display(), "Config hot-reload watcher started");
        Ok(())
    }

    pub fn stop(&self) {
        if self.watcher.lock().take().is_some() {
            tracing::info!("Config hot-reload watcher stopped");
        }
    }
}

async fn reload_into(
    path: &Path,
    store: &SnapshotStore,
    handlers: Option<&HandlerRegistry>,
) -> Result<()> {
    let mut config = Config::read(path).await?;
    config.apply_env_overrides();
    config.validate()?;

    if let Some(handlers) = handlers {
        handlers.replace_from_config(&config.handlers)?;
    }
    store.publish(config.snapshot());
    tracing::info!(
        path = %path.display(),
        agents = config.agents.len(),
        "Config hot-reloaded"
    );
    Ok(())
}
