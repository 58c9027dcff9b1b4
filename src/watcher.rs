use crate::error::Result;
use crate::indexer::Indexer;
use crate::models::IndexSummary;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// File name suffixes that never trigger indexing
pub const IGNORED_SUFFIXES: &[&str] = &[".log", ".tmp", ".run"];

/// A filesystem change, reduced to what the index cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// File created or written
    Changed(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
    Removed(PathBuf),
}

/// Sent to subscribers after the index processed a change
#[derive(Debug, Clone, PartialEq)]
pub struct WatchUpdate {
    pub path: PathBuf,
    pub summary: IndexSummary,
}

/// Paths the watcher never indexes: hidden names, excluded directories, noisy suffixes
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    excludes: Vec<String>,
}

impl IgnoreRules {
    pub fn new(excludes: &[String]) -> Self {
        Self {
            excludes: excludes.to_vec(),
        }
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if name.starts_with('.') || IGNORED_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            return true;
        }
        path.components().any(|c| {
            let part = c.as_os_str().to_string_lossy();
            self.excludes.iter().any(|ex| ex == part.as_ref())
        })
    }
}

/// Trailing-edge debounce: a path is due once `window` has passed since its
/// last change event, so a burst of writes is indexed once, after the last one
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    /// Record a change at `now`, pushing the path's deadline back
    pub fn touch(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path, now + self.window);
    }

    /// Forget a pending change; true if there was one
    pub fn cancel(&mut self, path: &Path) -> bool {
        self.pending.remove(path).is_some()
    }

    /// Earliest deadline among pending paths
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove and return the paths due at `now`, oldest deadline first
    pub fn take_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut due: Vec<(Instant, PathBuf)> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, deadline)| (*deadline, path.clone()))
            .collect();
        due.sort();
        for (_, path) in &due {
            self.pending.remove(path);
        }
        due.into_iter().map(|(_, path)| path).collect()
    }

    /// Remove and return every pending path
    pub fn drain(&mut self) -> Vec<PathBuf> {
        let mut all: Vec<(Instant, PathBuf)> = self.pending.drain().map(|(p, d)| (d, p)).collect();
        all.sort();
        all.into_iter().map(|(_, path)| path).collect()
    }
}

/// Map a raw notify event to index-relevant changes; directory events are dropped
pub fn translate(event: Event) -> Vec<WatchEvent> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => Vec::new(),
        EventKind::Create(_) => event
            .paths
            .into_iter()
            .filter(|p| !p.is_dir())
            .map(WatchEvent::Changed)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![WatchEvent::Renamed { from, to }],
                (Some(path), None) => vec![WatchEvent::Changed(path)],
                _ => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.into_iter().map(WatchEvent::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => event
            .paths
            .into_iter()
            .filter(|p| !p.is_dir())
            .map(WatchEvent::Changed)
            .collect(),
        EventKind::Remove(_) => event.paths.into_iter().map(WatchEvent::Removed).collect(),
        _ => Vec::new(),
    }
}

/// Applies watch events to an indexer
pub struct WatchHandler {
    indexer: Arc<dyn Indexer>,
    rules: IgnoreRules,
    debouncer: Debouncer,
    updates: broadcast::Sender<WatchUpdate>,
}

impl WatchHandler {
    pub fn new(
        indexer: Arc<dyn Indexer>,
        rules: IgnoreRules,
        window: Duration,
        updates: broadcast::Sender<WatchUpdate>,
    ) -> Self {
        Self {
            indexer,
            rules,
            debouncer: Debouncer::new(window),
            updates,
        }
    }

    /// Create/modify wait for the debounce window; renames and removals apply at once
    pub async fn handle(&mut self, event: WatchEvent, now: Instant) {
        match event {
            WatchEvent::Changed(path) => {
                if !self.rules.is_ignored(&path) {
                    self.debouncer.touch(path, now);
                }
            }
            WatchEvent::Renamed { from, to } => {
                for path in [from, to] {
                    if !self.rules.is_ignored(&path) {
                        self.debouncer.cancel(&path);
                        self.reindex(path).await;
                    }
                }
            }
            WatchEvent::Removed(path) => {
                if !self.rules.is_ignored(&path) {
                    self.debouncer.cancel(&path);
                    self.reindex(path).await;
                }
            }
        }
    }

    /// When the next debounced change falls due
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.next_deadline()
    }

    /// Index every change whose window has passed at `now`
    pub async fn flush(&mut self, now: Instant) {
        for path in self.debouncer.take_due(now) {
            debug!("Debounced change to {}", path.display());
            self.reindex(path).await;
        }
    }

    /// Index every pending change regardless of its deadline
    pub async fn flush_all(&mut self) {
        for path in self.debouncer.drain() {
            self.reindex(path).await;
        }
    }

    async fn reindex(&self, path: PathBuf) {
        match self.indexer.index_file(&path).await {
            Ok(summary) => {
                // no subscribers is fine
                let _ = self.updates.send(WatchUpdate { path, summary });
            }
            Err(e) => warn!("Failed to index {}: {}", path.display(), e),
        }
    }
}

/// Watches folders recursively and keeps the index in step with them
pub struct FolderWatcher {
    roots: Vec<PathBuf>,
    rules: IgnoreRules,
    window: Duration,
    updates: broadcast::Sender<WatchUpdate>,
}

impl FolderWatcher {
    /// Folders that are missing or not directories are skipped with a warning
    pub fn new(roots: &[PathBuf], excludes: &[String], window: Duration) -> Self {
        let roots = roots
            .iter()
            .filter_map(|root| match root.canonicalize() {
                Ok(dir) if dir.is_dir() => Some(dir),
                _ => {
                    warn!("Not watching {}: not a directory", root.display());
                    None
                }
            })
            .collect();

        let (updates, _) = broadcast::channel(100);
        Self {
            roots,
            rules: IgnoreRules::new(excludes),
            window,
            updates,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Get a receiver for index updates caused by filesystem changes
    pub fn subscribe(&self) -> broadcast::Receiver<WatchUpdate> {
        self.updates.subscribe()
    }

    /// Watch until the event stream ends, feeding changes to `indexer`
    pub async fn run(&self, indexer: Arc<dyn Indexer>) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => warn!("Watch error: {}", e),
            },
            Config::default(),
        )?;

        for root in &self.roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
            info!("Watching {}", root.display());
        }

        let mut handler = WatchHandler::new(
            indexer,
            self.rules.clone(),
            self.window,
            self.updates.clone(),
        );
        loop {
            let wake = handler.next_deadline();
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => {
                        for change in translate(event) {
                            handler.handle(change, Instant::now()).await;
                        }
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(wake.unwrap_or_else(Instant::now).into()), if wake.is_some() => {
                    handler.flush(Instant::now()).await;
                }
            }
        }
        debug!("Event stream closed, applying pending changes");
        handler.flush_all().await;
        Ok(())
    }
}
