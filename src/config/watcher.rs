//! Backend log watcher for read-cache invalidation
//!
//! Watches the directories holding the backend logs (so rotation and late
//! creation are seen) and emits an [`Invalidation`] when one of the logs
//! changes. The channel holds a single pending invalidation: a burst of
//! filesystem events collapses into one cache clear.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

/// A watched log changed; cached evidence may be stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalidation;

/// Owns the underlying filesystem watcher
///
/// Dropping it (or calling [`LogWatcher::stop`]) closes the invalidation
/// channel.
pub struct LogWatcher {
    watcher: Option<RecommendedWatcher>,
    watched: Vec<PathBuf>,
}

impl LogWatcher {
    /// Start watching `logs`, returning the invalidation receiver
    ///
    /// Logs whose directory does not exist are skipped with a warning.
    pub fn spawn(logs: &[PathBuf]) -> Result<(Self, mpsc::Receiver<Invalidation>)> {
        let (tx, rx) = mpsc::channel(1);

        let mut watched = Vec::new();
        let mut dirs = BTreeSet::new();
        for log in logs {
            match resolve_log_path(log) {
                Some((dir, file)) => {
                    dirs.insert(dir);
                    watched.push(file);
                }
                None => warn!("Not watching {}: parent directory unavailable", log.display()),
            }
        }

        let targets = watched.clone();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !is_content_change(&event.kind) {
                        return;
                    }
                    if !event.paths.iter().any(|p| targets.contains(p)) {
                        return;
                    }

                    debug!("Watched log changed: {:?}", event.paths);
                    match tx.try_send(Invalidation) {
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Closed(_)) => debug!("Invalidation receiver closed"),
                    }
                }
                Err(e) => {
                    error!("Watch error: {}", e);
                }
            }
        })
        .context("Failed to create log watcher")?;

        for dir in &dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch log directory: {}", dir.display()))?;
        }

        info!("Log watcher started for {} file(s)", watched.len());

        Ok((
            Self {
                watcher: Some(watcher),
                watched,
            },
            rx,
        ))
    }

    /// Files currently watched
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Stop watching and close the invalidation channel
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            for file in &self.watched {
                if let Some(dir) = file.parent() {
                    // Several files may share a directory
                    let _ = watcher.unwatch(dir);
                }
            }
            info!("Log watcher stopped");
        }
    }
}

impl Drop for LogWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

/// Canonical parent directory and the path events will report for the file
fn resolve_log_path(log: &Path) -> Option<(PathBuf, PathBuf)> {
    let file_name = log.file_name()?;
    let parent = match log.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = parent.canonicalize().ok()?;
    let file = dir.join(file_name);
    Some((dir, file))
}
