//! Configuration file watcher for hot reload.
//!
//! # Reload Flow
//! ```text
//! notify thread ──event for our file──▶ nudge ──▶ settle (DEBOUNCE) ──▶ load_config
//!                                                                           │
//!                         unchanged content / invalid file: dropped ◀───────┤
//!                                                                           ▼
//!                                                              mpsc::UnboundedSender
//! ```
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by writing a new file and renaming it over the old one are seen.
//! One save usually raises several events; they are collapsed into a single
//! reload so the balancer is rebuilt once per change.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ClientConfig;

/// Quiet period after the last event before the file is read.
pub const DEBOUNCE: Duration = Duration::from_millis(250);

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ClientConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ClientConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Must be called from within a tokio runtime.
    ///
    /// The returned watcher must be kept alive for updates to keep flowing;
    /// dropping it also stops the reload task.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let file_name = self.path.file_name().map(OsString::from).ok_or_else(|| {
            notify::Error::generic("config path has no file name")
                .add_path(self.path.clone())
        })?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (nudge_tx, nudge_rx) = mpsc::unbounded_channel::<()>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches_config(&event, &file_name) => {
                    let _ = nudge_tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let last_seen = std::fs::read_to_string(&self.path).ok();
        tokio::spawn(reload_loop(self.path.clone(), nudge_rx, self.update_tx, last_seen));

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

fn touches_config(event: &Event, file_name: &OsString) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

async fn reload_loop(
    path: PathBuf,
    mut nudges: mpsc::UnboundedReceiver<()>,
    updates: mpsc::UnboundedSender<ClientConfig>,
    mut last_seen: Option<String>,
) {
    while nudges.recv().await.is_some() {
        // Let the burst from one save settle.
        loop {
            tokio::time::sleep(DEBOUNCE).await;
            let mut more = false;
            while nudges.try_recv().is_ok() {
                more = true;
            }
            if !more {
                break;
            }
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read config, keeping current configuration");
                continue;
            }
        };
        if last_seen.as_deref() == Some(content.as_str()) {
            tracing::debug!("Config file touched without changes");
            continue;
        }
        last_seen = Some(content);

        tracing::info!("Config file change detected, reloading");
        match load_config(&path) {
            Ok(config) => {
                if updates.send(config).is_err() {
                    tracing::debug!("Config receiver dropped, stopping reloads");
                    return;
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to reload config, keeping current configuration"),
        }
    }
}
